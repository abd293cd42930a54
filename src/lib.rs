pub mod cache;
pub mod config;
pub mod error;
pub mod preset;
pub mod proxy;
pub mod resolver;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
