use crate::cache::{DiskCache, ResizeCache};
use crate::config::{ProxyConfig, DEFAULT_PAGE_SIZE};
use crate::error::{ProxyError, Result};
use crate::preset::select_target;
use crate::resolver::{ResolvedMedia, Resolver};
use crate::upstream::{ByteStream, Upstream, UpstreamRequest, UpstreamResponse};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, RANGE,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

pub type ResponseBody = UnsyncBoxBody<Bytes, ProxyError>;

const OCTET_STREAM: &str = "application/octet-stream";

pub struct AppState {
    pub config: ProxyConfig,
    pub resolver: Resolver,
    pub resize_cache: ResizeCache,
}

impl AppState {
    pub async fn new(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> std::io::Result<Self> {
        let disk = DiskCache::new(&config.cache_dir).await?;
        Ok(Self {
            resolver: Resolver::from_config(&config, upstream),
            resize_cache: ResizeCache::new(disk, config.max_original_bytes),
            config,
        })
    }
}

/// Client-supplied options for `/proxy`.
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    pub content_id: String,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub mode: Option<String>,
}

struct Params(HashMap<String, String>);

impl Params {
    fn parse(query: Option<&str>) -> Self {
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
        Self(pairs)
    }

    fn optional(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.optional(name)
            .ok_or_else(|| ProxyError::InvalidRequest(format!("missing query parameter `{name}`")))
    }

    fn number(&self, name: &str) -> Result<Option<u32>> {
        self.optional(name)
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    ProxyError::InvalidRequest(format!("`{name}` must be a non-negative integer"))
                })
            })
            .transpose()
    }
}

pub fn stream_body(stream: ByteStream) -> ResponseBody {
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<ResponseBody>> {
    let body = serde_json::to_vec(value).map_err(|e| ProxyError::Protocol(e.to_string()))?;
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

pub fn error_response(err: &ProxyError) -> Response<ResponseBody> {
    let status = err.status_code();
    let body = serde_json::json!({ "detail": err.to_string() });
    let mut response = Response::new(full_body(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn content_type_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM))
}

fn streamed(status: StatusCode, content_type: &str, body: ByteStream) -> Response<ResponseBody> {
    let mut response = Response::new(stream_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, content_type_value(content_type));
    response
}

fn copy_header(from: &HeaderMap, to: &mut HeaderMap, name: HeaderName) {
    if let Some(value) = from.get(&name) {
        to.insert(name, value.clone());
    }
}

/// Routes one request. Errors are rendered here so callers always get a
/// response.
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<ResponseBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        let mut response = Response::new(full_body(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        return response;
    }
    if method != Method::GET && method != Method::HEAD {
        let mut response = error_response(&ProxyError::InvalidRequest(format!(
            "{method} is not supported"
        )));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return response;
    }

    let params = Params::parse(req.uri().query());
    let range = req
        .headers()
        .get(RANGE)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    drop(req);

    let result = match path.as_str() {
        "/proxy" => match media_query(&params) {
            Ok(query) => serve(&state, &query, range.as_deref()).await,
            Err(e) => Err(e),
        },
        "/get_content" => get_content(&state, &params).await,
        "/pixeldrain/resolve" => secondary_resolve(&state, &params).await,
        "/pixeldrain/info" => secondary_info(&state, &params).await,
        "/pixeldrain/thumbnail" => secondary_thumbnail(&state, &params).await,
        "/pixeldrain/file" => secondary_file(&state, &params).await,
        _ => Err(ProxyError::NotFound),
    };

    match result {
        Ok(response) => {
            debug!(path = %path, status = %response.status(), "served");
            response
        }
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(path = %path, status = %status, error = %err, "request failed");
            } else {
                debug!(path = %path, status = %status, error = %err, "request rejected");
            }
            error_response(&err)
        }
    }
}

fn media_query(params: &Params) -> Result<MediaQuery> {
    Ok(MediaQuery {
        content_id: params.required("content_id")?.to_string(),
        max_width: params.number("max_width")?,
        max_height: params.number("max_height")?,
        mode: params.optional("mode").map(str::to_string),
    })
}

/// Resolves `query.content_id` and streams it: a cached resize for sized
/// image requests, range forwarding for video, the raw bytes otherwise.
pub async fn serve(
    state: &AppState,
    query: &MediaQuery,
    range: Option<&str>,
) -> Result<Response<ResponseBody>> {
    let media = state.resolver.resolve(&query.content_id).await?;
    let headers = state.resolver.fetch_headers(&media);

    if media.is_image() {
        match select_target(query.max_width, query.max_height, query.mode.as_deref()) {
            Some(target) => serve_resized(state, &query.content_id, &media, target, headers).await,
            None => passthrough(state, &media, headers).await,
        }
    } else if media.is_video() {
        range_forward(state, &media, headers, range).await
    } else {
        passthrough(state, &media, headers).await
    }
}

async fn serve_resized(
    state: &AppState,
    content_id: &str,
    media: &ResolvedMedia,
    target: (u32, u32),
    headers: HeaderMap,
) -> Result<Response<ResponseBody>> {
    let upstream = state.resolver.upstream();
    let fetch = || upstream.get(UpstreamRequest::new(&media.playable_url).headers(headers));
    let body = state
        .resize_cache
        .get_or_create(content_id, target, &media.extension_hint(), fetch)
        .await?;
    Ok(streamed(StatusCode::OK, &media.mime_type, body))
}

async fn range_forward(
    state: &AppState,
    media: &ResolvedMedia,
    mut headers: HeaderMap,
    range: Option<&str>,
) -> Result<Response<ResponseBody>> {
    // no Range from the client still asks upstream for the whole file
    let range = HeaderValue::from_str(range.unwrap_or("bytes=0-"))
        .map_err(|_| ProxyError::InvalidRequest("malformed Range header".into()))?;
    headers.insert(RANGE, range);

    let upstream = state
        .resolver
        .upstream()
        .get(UpstreamRequest::new(&media.playable_url).headers(headers))
        .await?;
    if upstream.status != StatusCode::OK && upstream.status != StatusCode::PARTIAL_CONTENT {
        return Err(ProxyError::upstream(upstream.status));
    }

    let content_type = declared_type(&upstream, &media.mime_type);
    let UpstreamResponse {
        status,
        headers: upstream_headers,
        body,
    } = upstream;

    let mut response = streamed(status, &content_type, body);
    let out = response.headers_mut();
    copy_header(&upstream_headers, out, CONTENT_RANGE);
    copy_header(&upstream_headers, out, CONTENT_LENGTH);
    let accept = upstream_headers
        .get(ACCEPT_RANGES)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("bytes"));
    out.insert(ACCEPT_RANGES, accept);
    Ok(response)
}

async fn passthrough(
    state: &AppState,
    media: &ResolvedMedia,
    headers: HeaderMap,
) -> Result<Response<ResponseBody>> {
    let upstream = state
        .resolver
        .upstream()
        .get(UpstreamRequest::new(&media.playable_url).headers(headers))
        .await?;
    if upstream.status != StatusCode::OK {
        return Err(ProxyError::upstream(upstream.status));
    }
    let content_type = declared_type(&upstream, &media.mime_type);
    Ok(streamed(StatusCode::OK, &content_type, upstream.body))
}

fn declared_type(upstream: &UpstreamResponse, fallback: &str) -> String {
    upstream
        .header(CONTENT_TYPE)
        .filter(|v| !v.is_empty())
        .unwrap_or(if fallback.is_empty() { OCTET_STREAM } else { fallback })
        .to_string()
}

async fn get_content(state: &AppState, params: &Params) -> Result<Response<ResponseBody>> {
    let content_id = params.required("content_id")?;
    let page_size = params.number("page_size")?.unwrap_or(DEFAULT_PAGE_SIZE);
    let listing = state
        .resolver
        .primary()
        .list_for_display(content_id, page_size)
        .await?;
    json_response(StatusCode::OK, &listing)
}

async fn secondary_resolve(state: &AppState, params: &Params) -> Result<Response<ResponseBody>> {
    let content_id = params.required("content_id")?;
    let resolution = state.resolver.secondary().resolve(content_id).await?;
    json_response(StatusCode::OK, &resolution)
}

async fn secondary_info(state: &AppState, params: &Params) -> Result<Response<ResponseBody>> {
    let file_id = params.required("file_id")?;
    let info = state.resolver.secondary().info(file_id).await?;
    json_response(StatusCode::OK, &info)
}

async fn secondary_thumbnail(state: &AppState, params: &Params) -> Result<Response<ResponseBody>> {
    let file_id = params.required("file_id")?;
    let width = params.number("width")?.unwrap_or(128);
    let height = params.number("height")?.unwrap_or(128);

    let secondary = state.resolver.secondary();
    let upstream = secondary
        .stream(
            UpstreamRequest::new(secondary.thumbnail_url(file_id)?)
                .query("width", width)
                .query("height", height),
        )
        .await?;
    if upstream.status != StatusCode::OK {
        return Err(ProxyError::upstream(upstream.status));
    }
    let content_type = declared_type(&upstream, "image/png");
    Ok(streamed(StatusCode::OK, &content_type, upstream.body))
}

async fn secondary_file(state: &AppState, params: &Params) -> Result<Response<ResponseBody>> {
    let file_id = params.required("file_id")?;
    let secondary = state.resolver.secondary();
    let upstream = secondary
        .stream(UpstreamRequest::new(secondary.raw_file_url(file_id)?))
        .await?;
    if upstream.status != StatusCode::OK {
        return Err(ProxyError::upstream(upstream.status));
    }
    let content_type = declared_type(&upstream, OCTET_STREAM);
    Ok(streamed(StatusCode::OK, &content_type, upstream.body))
}
