mod primary;
mod secondary;

pub use primary::*;
pub use secondary::*;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::upstream::Upstream;
use hyper::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    PrimaryApi,
    SecondaryApi,
}

/// Per-request result of resolution; never cached or shared.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub backend: Backend,
    pub playable_url: String,
    pub mime_type: String,
    pub display_name: String,
    pub raw_metadata: Value,
}

impl ResolvedMedia {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// Lowercased suffix of the display name, `jpg` when there is none.
    pub fn extension_hint(&self) -> String {
        self.display_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "jpg".to_string())
    }
}

pub struct Resolver {
    upstream: Arc<dyn Upstream>,
    primary: PrimaryBackend,
    secondary: SecondaryBackend,
}

impl Resolver {
    pub fn from_config(config: &ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            primary: PrimaryBackend::new(upstream.clone(), config),
            secondary: SecondaryBackend::new(upstream.clone(), &config.secondary_root),
            upstream,
        }
    }

    pub fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    pub fn primary(&self) -> &PrimaryBackend {
        &self.primary
    }

    pub fn secondary(&self) -> &SecondaryBackend {
        &self.secondary
    }

    /// Finds the backend owning `content_id`: primary first, then the
    /// secondary file-info shapes when the primary does not know it.
    pub async fn resolve(&self, content_id: &str) -> Result<ResolvedMedia> {
        if content_id.trim().is_empty() {
            return Err(ProxyError::InvalidRequest("content_id is empty".into()));
        }

        match self.primary.resolve(content_id).await {
            Err(ProxyError::NotFound) => {
                debug!(content_id = %content_id, "not on primary, trying secondary");
                self.secondary.resolve_media(content_id).await
            }
            other => other,
        }
    }

    /// Headers required to fetch `media.playable_url`.
    pub fn fetch_headers(&self, media: &ResolvedMedia) -> HeaderMap {
        match media.backend {
            Backend::PrimaryApi => self.primary.auth_headers(),
            Backend::SecondaryApi => HeaderMap::new(),
        }
    }
}
