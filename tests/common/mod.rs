#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use media_proxy_server::proxy::{handle_request, AppState, ResponseBody};
use media_proxy_server::upstream::{once_stream, Upstream, UpstreamRequest, UpstreamResponse};
use media_proxy_server::{ProxyConfig, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE: &str = "http://upstream.test";

#[derive(Clone)]
pub struct Canned {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, &'static str)>,
    pub body: Bytes,
}

impl Canned {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json(value: Value) -> Self {
        Self::new(StatusCode::OK, value.to_string()).header(hyper::header::CONTENT_TYPE, "application/json")
    }

    pub fn header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

/// In-process upstream keyed by URL, counting every request it sees.
#[derive(Default)]
pub struct StubUpstream {
    routes: Mutex<HashMap<String, Canned>>,
    hits: Mutex<HashMap<String, usize>>,
    seen: Mutex<Vec<UpstreamRequest>>,
}

impl StubUpstream {
    pub fn route(&self, path: &str, canned: Canned) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{BASE}{path}"), canned);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(&format!("{BASE}{path}"))
            .copied()
            .unwrap_or(0)
    }

    pub fn requests_to(&self, path: &str) -> Vec<UpstreamRequest> {
        let url = format!("{BASE}{path}");
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn get(&self, req: UpstreamRequest) -> Result<UpstreamResponse> {
        *self.hits.lock().unwrap().entry(req.url.clone()).or_default() += 1;
        let canned = self.routes.lock().unwrap().get(&req.url).cloned();
        self.seen.lock().unwrap().push(req);

        let canned = canned.unwrap_or_else(|| Canned::new(StatusCode::NOT_FOUND, "not found"));
        let mut headers = hyper::HeaderMap::new();
        for (name, value) in canned.headers {
            headers.insert(name, HeaderValue::from_static(value));
        }
        Ok(UpstreamResponse {
            status: canned.status,
            headers,
            body: once_stream(canned.body),
        })
    }
}

pub struct Harness {
    pub upstream: Arc<StubUpstream>,
    pub state: Arc<AppState>,
    pub cache_dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let cache_dir = tempfile::tempdir().unwrap();
        let upstream = Arc::new(StubUpstream::default());
        let config = ProxyConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            public_base_url: "http://proxy.test:8000".to_string(),
            primary_api_url: BASE.to_string(),
            primary_token: "test-token".to_string(),
            primary_website_token: String::new(),
            secondary_root: BASE.to_string(),
            cache_dir: cache_dir.path().to_path_buf(),
            max_connections: 100,
            max_original_bytes: 64 * 1024 * 1024,
            upstream_timeout_secs: 30,
        };
        let state = Arc::new(AppState::new(config, upstream.clone()).await.unwrap());
        Self {
            upstream,
            state,
            cache_dir,
        }
    }

    /// Registers `id` on the primary API as a file served from `/media/{id}`.
    pub fn primary_file(&self, id: &str, mime: &str, name: &str, media: Canned) {
        let doc = json!({
            "status": "ok",
            "data": {
                "id": id,
                "type": "file",
                "name": name,
                "mimetype": mime,
                "link": format!("{BASE}/media/{id}"),
            }
        });
        self.upstream.route(&format!("/contents/{id}"), Canned::json(doc));
        self.upstream.route(&format!("/media/{id}"), media);
    }

    pub fn primary_not_found(&self, id: &str) {
        self.upstream.route(
            &format!("/contents/{id}"),
            Canned::json(json!({"status": "error-notFound", "data": {}})),
        );
    }

    pub async fn get(&self, uri: &str) -> Response<ResponseBody> {
        self.get_with(Request::builder().uri(uri)).await
    }

    pub async fn get_with(&self, builder: hyper::http::request::Builder) -> Response<ResponseBody> {
        handle_request(builder.body(()).unwrap(), self.state.clone()).await
    }

    pub fn cached_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.cache_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<ResponseBody>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
