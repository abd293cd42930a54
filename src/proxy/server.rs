use crate::config::ProxyConfig;
use crate::proxy::handler::{handle_request, AppState, ResponseBody};
use crate::upstream::{HttpUpstream, Upstream};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub struct ProxyServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    semaphore: Arc<Semaphore>,
}

impl ProxyServer {
    pub async fn new(config: ProxyConfig) -> io::Result<Self> {
        let upstream = HttpUpstream::new(config.upstream_timeout())
            .map_err(|e| io::Error::other(e.to_string()))?;
        Self::with_upstream(config, Arc::new(upstream)).await
    }

    pub async fn with_upstream(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> io::Result<Self> {
        let addr = config.bind;
        let semaphore = Arc::new(Semaphore::new(config.max_connections.max(1)));
        let state = Arc::new(AppState::new(config, upstream).await?);
        Ok(Self {
            addr,
            state,
            semaphore,
        })
    }

    /// Accepts connections until ctrl-c. Each connection runs on its own
    /// task; the semaphore bounds requests in flight across all of them.
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(
            addr = %listener.local_addr()?,
            cache_dir = %self.state.resize_cache.disk().dir().display(),
            max_connections = self.semaphore.available_permits(),
            "media proxy listening"
        );

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    return Ok(());
                }
            };

            let state = self.state.clone();
            let semaphore = self.semaphore.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = state.clone();
                    let semaphore = semaphore.clone();
                    async move { Ok::<_, Infallible>(serve_one(req, state, semaphore).await) }
                });

                if let Err(e) = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn serve_one(
    req: Request<Incoming>,
    state: Arc<AppState>,
    semaphore: Arc<Semaphore>,
) -> Response<ResponseBody> {
    // the permit covers resolution and response setup, not body streaming
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => Some(permit),
        Err(_) => {
            warn!("request semaphore closed");
            None
        }
    };
    let mut response = handle_request(req, state).await;
    with_cors(&mut response);
    response
}

/// Permissive CORS, any origin may embed the media.
pub fn with_cors(response: &mut Response<ResponseBody>) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Range, Content-Length, Accept-Ranges"),
    );
}
