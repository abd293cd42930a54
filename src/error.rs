use hyper::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("content not found")]
    NotFound,

    #[error("upstream responded with {status}")]
    Upstream { status: StatusCode },

    #[error("upstream unreachable: {0}")]
    Network(String),

    #[error("upstream timed out")]
    Timeout,

    #[error("upstream protocol violation: {0}")]
    Protocol(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("cache write failed: {0}")]
    CacheWrite(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// HTTP status this error is rendered with. Upstream failures mirror the
    /// upstream status so clients see the same semantics.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::Upstream { status } => *status,
            ProxyError::Network(_) | ProxyError::Protocol(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Decode(_) | ProxyError::CacheWrite(_) | ProxyError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn upstream(status: StatusCode) -> Self {
        ProxyError::Upstream { status }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout
        } else {
            // strip the url, it may carry credentials in the query
            ProxyError::Network(err.without_url().to_string())
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Protocol(format!("invalid json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
