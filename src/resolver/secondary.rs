use super::{Backend, ResolvedMedia};
use crate::error::{ProxyError, Result};
use crate::upstream::{segment_url, Upstream, UpstreamRequest, UpstreamResponse};
use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// What a secondary id turned out to be.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Resolution {
    List(Value),
    File(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    List,
    FileInfo,
}

/// Client for the secondary file-sharing API. Every metadata lookup is
/// tried under the versioned `/api/...` path and then the bare path.
pub struct SecondaryBackend {
    upstream: Arc<dyn Upstream>,
    root: String,
}

impl SecondaryBackend {
    pub fn new(upstream: Arc<dyn Upstream>, root: &str) -> Self {
        Self {
            upstream,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn file_url(&self, file_id: &str) -> Result<String> {
        segment_url(&self.root, &["api", "file", file_id])
    }

    pub fn raw_file_url(&self, file_id: &str) -> Result<String> {
        segment_url(&self.root, &["file", file_id])
    }

    pub fn thumbnail_url(&self, file_id: &str) -> Result<String> {
        segment_url(&self.root, &["file", file_id, "thumbnail"])
    }

    // versioned form first, then the bare one
    fn candidates<'a>(
        id: &'a str,
        shapes: &'static [Shape],
    ) -> impl Iterator<Item = (Shape, Vec<&'a str>)> + 'a {
        shapes.iter().flat_map(move |shape| {
            let path = match shape {
                Shape::List => vec!["list", id],
                Shape::FileInfo => vec!["file", id, "info"],
            };
            let versioned = std::iter::once("api").chain(path.iter().copied()).collect();
            [(*shape, versioned), (*shape, path)]
        })
    }

    async fn fetch_json(&self, segments: &[&str]) -> Result<Value> {
        let url = segment_url(&self.root, segments)?;
        let response = self.upstream.get(UpstreamRequest::new(url)).await?;
        if response.status != StatusCode::OK {
            return Err(ProxyError::upstream(response.status));
        }
        response.json().await
    }

    async fn first_accepted<'a>(
        &self,
        candidates: impl Iterator<Item = (Shape, Vec<&'a str>)>,
    ) -> Result<Resolution> {
        let mut last_err = ProxyError::NotFound;
        for (shape, segments) in candidates {
            let path = segments.join("/");
            match self.fetch_json(&segments).await {
                Ok(data) => match shape {
                    Shape::List if has_files(&data) => return Ok(Resolution::List(data)),
                    Shape::List => debug!(path = %path, "empty listing, skipping"),
                    Shape::FileInfo => return Ok(Resolution::File(data)),
                },
                Err(e) => {
                    debug!(path = %path, error = %e, "secondary shape rejected");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Classifies an id as a listing or a single file. Failing every shape
    /// is `NotFound`; an id that is not a usable path segment is rejected.
    pub async fn resolve(&self, content_id: &str) -> Result<Resolution> {
        self.first_accepted(Self::candidates(content_id, &[Shape::List, Shape::FileInfo]))
            .await
            .map_err(not_found_unless_invalid)
    }

    /// Upstream file-info document. Mirrors the last upstream failure.
    pub async fn info(&self, file_id: &str) -> Result<Value> {
        match self
            .first_accepted(Self::candidates(file_id, &[Shape::FileInfo]))
            .await?
        {
            Resolution::File(data) | Resolution::List(data) => Ok(data),
        }
    }

    pub async fn resolve_media(&self, content_id: &str) -> Result<ResolvedMedia> {
        let info = self
            .info(content_id)
            .await
            .map_err(not_found_unless_invalid)?;
        Ok(ResolvedMedia {
            backend: Backend::SecondaryApi,
            playable_url: self.file_url(content_id)?,
            mime_type: info
                .get("mime_type")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream")
                .to_string(),
            display_name: info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            raw_metadata: info,
        })
    }

    /// Raw GET against the secondary host, used by the streaming routes.
    pub async fn stream(&self, req: UpstreamRequest) -> Result<UpstreamResponse> {
        self.upstream.get(req).await
    }
}

fn not_found_unless_invalid(err: ProxyError) -> ProxyError {
    match err {
        ProxyError::InvalidRequest(_) => err,
        _ => ProxyError::NotFound,
    }
}

fn has_files(data: &Value) -> bool {
    data.get("files")
        .and_then(Value::as_array)
        .is_some_and(|files| !files.is_empty())
}
