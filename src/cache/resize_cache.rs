use super::{resize_to_fit, CacheKey, DiskCache};
use crate::config::CHUNK_SIZE;
use crate::error::{ProxyError, Result};
use crate::upstream::{once_stream, rechunk, Buffered, ByteStream, UpstreamResponse};
use futures_util::TryStreamExt;
use hyper::header::CONTENT_LENGTH;
use hyper::StatusCode;
use std::future::Future;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Fill-on-miss store of resized image variants.
#[derive(Debug, Clone)]
pub struct ResizeCache {
    disk: DiskCache,
    max_original_bytes: usize,
}

impl ResizeCache {
    pub fn new(disk: DiskCache, max_original_bytes: usize) -> Self {
        Self {
            disk,
            max_original_bytes,
        }
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Streams the variant of `content_id` sized to `target`. On a miss the
    /// original is pulled through `fetch_source`, resized, persisted and
    /// served; a hit never touches the upstream.
    pub async fn get_or_create<F, Fut>(
        &self,
        content_id: &str,
        target: (u32, u32),
        extension_hint: &str,
        fetch_source: F,
    ) -> Result<ByteStream>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<UpstreamResponse>>,
    {
        let key = CacheKey::new(content_id, Some(target), extension_hint);

        match self.disk.open(&key).await {
            Ok(Some(file)) => {
                debug!(key = %key, "resize cache hit");
                let stream = ReaderStream::with_capacity(file, CHUNK_SIZE).map_err(ProxyError::Io);
                return Ok(Box::pin(stream));
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "resize cache unreadable, regenerating"),
        }

        let source = fetch_source().await?;
        if source.status != StatusCode::OK {
            return Err(ProxyError::upstream(source.status));
        }

        let declared = source
            .header(CONTENT_LENGTH)
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_original_bytes) {
            warn!(key = %key, "original exceeds resize limit, passing through");
            return Ok(source.body);
        }

        let original = match source.buffer_up_to(self.max_original_bytes).await? {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(stream) => {
                warn!(key = %key, "original exceeds resize limit, passing through");
                return Ok(stream);
            }
        };

        let (width, height) = target;
        let resized = tokio::task::spawn_blocking(move || resize_to_fit(&original, width, height))
            .await
            .map_err(|e| ProxyError::Decode(format!("resize task failed: {e}")))??;

        match self.disk.save(&key, &resized.bytes).await {
            Ok(()) => info!(
                key = %key,
                width = resized.width,
                height = resized.height,
                bytes = resized.bytes.len(),
                "resize cache filled"
            ),
            Err(e) => {
                let err = ProxyError::CacheWrite(e);
                warn!(key = %key, error = %err, "serving resized bytes without caching");
            }
        }

        Ok(rechunk(once_stream(resized.bytes), CHUNK_SIZE))
    }
}
