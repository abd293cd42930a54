use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Bytes per streamed body chunk.
pub const CHUNK_SIZE: usize = 8 * 1024;
/// Default page size for primary listings.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Unified media resolution and streaming proxy", long_about = None)]
pub struct ProxyConfig {
    /// Address the proxy listens on
    #[arg(long, env = "MEDIA_PROXY_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Externally reachable base URL, used when rewriting listing links
    #[arg(long, env = "MEDIA_PROXY_PUBLIC_URL", default_value = "http://127.0.0.1:8000")]
    pub public_base_url: String,

    /// Primary content API base URL
    #[arg(long, env = "PRIMARY_API_URL", default_value = "https://api.gofile.io")]
    pub primary_api_url: String,

    /// Bearer token for the primary content API
    #[arg(long, env = "PRIMARY_API_TOKEN", default_value = "", hide_env_values = true)]
    pub primary_token: String,

    /// Website token (`wt`) for the primary content API
    #[arg(long, env = "PRIMARY_WEBSITE_TOKEN", default_value = "", hide_env_values = true)]
    pub primary_website_token: String,

    /// Secondary file-sharing API root
    #[arg(long, env = "SECONDARY_ROOT_URL", default_value = "https://pixeldrain.com")]
    pub secondary_root: String,

    /// Directory holding derived image variants
    #[arg(long, env = "MEDIA_PROXY_CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Maximum number of requests served concurrently
    #[arg(long, env = "MEDIA_PROXY_MAX_CONNECTIONS", default_value_t = 100)]
    pub max_connections: usize,

    /// Largest original accepted into memory for resizing
    #[arg(long, env = "MEDIA_PROXY_MAX_ORIGINAL_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_original_bytes: usize,

    /// Upstream connect/read timeout in seconds
    #[arg(long, env = "MEDIA_PROXY_UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
