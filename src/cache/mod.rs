mod disk_cache;
mod resize;
mod resize_cache;

pub use disk_cache::*;
pub use resize::*;
pub use resize_cache::*;

use sha2::{Digest, Sha256};

/// Target box for a derived variant; `None` keeps the original size.
pub type Target = Option<(u32, u32)>;

/// Deterministic name of a derived asset:
/// `{content_id}_{width|orig}x{height|orig}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(content_id: &str, target: Target, extension: &str) -> Self {
        let size_tag = match target {
            Some((w, h)) => format!("{w}x{h}"),
            None => "origxorig".to_string(),
        };
        let ext: String = extension
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let ext = if ext.is_empty() { "jpg".to_string() } else { ext };
        Self(format!("{}_{}.{}", safe_id(content_id), size_tag, ext))
    }

    pub fn file_name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ids that are not plain `[A-Za-z0-9_-]` are replaced by their SHA-256 so
/// they can never escape the cache directory.
fn safe_id(content_id: &str) -> String {
    let plain = !content_id.is_empty()
        && content_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        content_id.to_string()
    } else {
        let mut hasher = Sha256::new();
        hasher.update(content_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}
