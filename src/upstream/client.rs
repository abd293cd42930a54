use super::{rechunk, Upstream, UpstreamRequest, UpstreamResponse};
use crate::config::CHUNK_SIZE;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::time::Duration;
use tracing::debug;

/// reqwest-backed upstream.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(ProxyError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, req: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = url::Url::parse(&req.url)
            .map_err(|e| ProxyError::InvalidRequest(format!("bad upstream url: {e}")))?;
        debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "upstream GET");

        let response = self
            .client
            .get(url)
            .query(&req.query)
            .headers(req.headers)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = rechunk(response.bytes_stream().map_err(ProxyError::from), CHUNK_SIZE);

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
