mod client;

pub use client::*;

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use hyper::header::HeaderMap;
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use std::pin::Pin;

/// Ordered, finite sequence of body chunks, consumed once.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct UpstreamRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl UpstreamRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn header(&self, name: hyper::header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|h| h.to_str().ok())
    }

    /// Buffers the body as long as it stays within `max` bytes. On overflow
    /// the bytes read so far are stitched back in front of the remainder.
    pub async fn buffer_up_to(self, max: usize) -> Result<Buffered> {
        let mut body = BytesMut::new();
        let mut stream = self.body;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len().saturating_add(chunk.len()) > max {
                body.extend_from_slice(&chunk);
                let prefix = once_stream(body.freeze());
                return Ok(Buffered::Overflow(Box::pin(prefix.chain(stream))));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Buffered::Complete(body.freeze()))
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        match self.buffer_up_to(MAX_JSON_BYTES).await? {
            Buffered::Complete(body) => Ok(serde_json::from_slice(&body)?),
            Buffered::Overflow(_) => Err(ProxyError::Protocol(format!(
                "json body larger than {MAX_JSON_BYTES} bytes"
            ))),
        }
    }
}

const MAX_JSON_BYTES: usize = 16 * 1024 * 1024;

pub enum Buffered {
    Complete(Bytes),
    Overflow(ByteStream),
}

/// Anything that can fetch a URL. Every status is returned as a response;
/// callers decide which statuses count as success.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(&self, req: UpstreamRequest) -> Result<UpstreamResponse>;
}

pub fn rechunk<S>(inner: S, max: usize) -> ByteStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let max = max.max(1);
    Box::pin(inner.flat_map(move |chunk| {
        let pieces: Vec<Result<Bytes>> = match chunk {
            Ok(mut bytes) => {
                let mut out = Vec::with_capacity(bytes.len() / max + 1);
                while bytes.len() > max {
                    out.push(Ok(bytes.split_to(max)));
                }
                if !bytes.is_empty() {
                    out.push(Ok(bytes));
                }
                out
            }
            Err(e) => vec![Err(e)],
        };
        stream::iter(pieces)
    }))
}

/// Appends `segments` to the path of `base`, each percent-encoded as a
/// single segment, so ids can never climb out of the intended path.
pub fn segment_url(base: &str, segments: &[&str]) -> Result<String> {
    if let Some(bad) = segments.iter().find(|s| s.is_empty() || **s == "." || **s == "..") {
        return Err(ProxyError::InvalidRequest(format!("`{bad}` is not a valid id")));
    }
    let mut url = url::Url::parse(base)
        .map_err(|e| ProxyError::InvalidRequest(format!("bad upstream base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ProxyError::InvalidRequest(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

pub fn once_stream(bytes: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(bytes) }))
}
