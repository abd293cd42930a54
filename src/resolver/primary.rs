use super::{Backend, ResolvedMedia};
use crate::config::{ProxyConfig, DEFAULT_PAGE_SIZE};
use crate::error::{ProxyError, Result};
use crate::upstream::{segment_url, Upstream, UpstreamRequest};
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use hyper::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use url::Url;

const STATUS_OK: &str = "ok";
const STATUS_NOT_FOUND: &str = "error-notFound";

/// Query options for a primary `contents` lookup.
#[derive(Debug, Clone)]
pub struct ContentsQuery {
    pub content_filter: String,
    pub page: u32,
    pub page_size: u32,
    pub sort_field: String,
    pub sort_direction: i8,
    pub password: Option<String>,
}

impl Default for ContentsQuery {
    fn default() -> Self {
        Self {
            content_filter: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_field: "createTime".to_string(),
            sort_direction: -1,
            password: None,
        }
    }
}

/// Authenticated client for the primary content API.
pub struct PrimaryBackend {
    upstream: Arc<dyn Upstream>,
    api_url: String,
    token: String,
    website_token: String,
    public_base_url: String,
}

impl PrimaryBackend {
    pub fn new(upstream: Arc<dyn Upstream>, config: &ProxyConfig) -> Self {
        Self {
            upstream,
            api_url: config.primary_api_url.trim_end_matches('/').to_string(),
            token: config.primary_token.clone(),
            website_token: config.primary_website_token.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("primary token is not a valid header value, sending unauthenticated"),
        }
        headers
    }

    /// Raw metadata document. Both `ok` and the not-found sentinel come back
    /// as `Ok`; any other status field is a protocol violation.
    pub async fn contents(&self, content_id: &str, query: &ContentsQuery) -> Result<Value> {
        let url = segment_url(&self.api_url, &["contents", content_id])?;
        let mut req = UpstreamRequest::new(url)
            .headers(self.auth_headers())
            .query("wt", &self.website_token)
            .query("contentFilter", &query.content_filter)
            .query("page", query.page)
            .query("pageSize", query.page_size)
            .query("sortField", &query.sort_field)
            .query("sortDirection", query.sort_direction);
        if let Some(password) = &query.password {
            req = req.query("password", password);
        }

        let response = self.upstream.get(req).await?;
        if response.status != StatusCode::OK {
            return Err(ProxyError::upstream(response.status));
        }
        let doc: Value = response.json().await?;

        match doc.get("status").and_then(Value::as_str) {
            Some(STATUS_OK) | Some(STATUS_NOT_FOUND) => Ok(doc),
            Some(other) => Err(ProxyError::Protocol(format!("primary status {other}"))),
            None => Err(ProxyError::Protocol("primary response has no status".into())),
        }
    }

    /// Listing for clients, with every file link pointed back at `/proxy`.
    pub async fn list_for_display(&self, content_id: &str, page_size: u32) -> Result<Value> {
        let query = ContentsQuery {
            page_size,
            ..Default::default()
        };
        let mut doc = self.contents(content_id, &query).await?;
        rewrite_child_links(&mut doc, &self.public_base_url);
        Ok(doc)
    }

    pub async fn resolve(&self, content_id: &str) -> Result<ResolvedMedia> {
        let doc = match self.contents(content_id, &ContentsQuery::default()).await {
            Err(ProxyError::Upstream { status }) if status == StatusCode::NOT_FOUND => {
                return Err(ProxyError::NotFound);
            }
            other => other?,
        };
        if doc.get("status").and_then(Value::as_str) == Some(STATUS_NOT_FOUND) {
            return Err(ProxyError::NotFound);
        }

        let data = doc.get("data").cloned().unwrap_or(Value::Null);
        if data.get("type").and_then(Value::as_str) == Some("folder") {
            return Err(ProxyError::InvalidRequest(format!(
                "{content_id} is a folder, not a playable file"
            )));
        }
        let playable_url = data
            .get("link")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::Protocol("primary file has no link".into()))?
            .to_string();

        Ok(ResolvedMedia {
            backend: Backend::PrimaryApi,
            playable_url,
            mime_type: string_field(&data, "mimetype")
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            display_name: string_field(&data, "name").unwrap_or_default(),
            raw_metadata: data,
        })
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Keeps each child's upstream link under `link_original` and replaces the
/// link of every non-folder child with this proxy's streaming endpoint.
pub fn rewrite_child_links(doc: &mut Value, public_base_url: &str) {
    let Some(children) = doc
        .pointer_mut("/data/children")
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    for (key, child) in children.iter_mut() {
        let Some(item) = child.as_object_mut() else {
            continue;
        };
        let original = item.get("link").cloned().unwrap_or(Value::Null);
        item.insert("link_original".to_string(), original);

        if item.get("type").and_then(Value::as_str) == Some("folder") {
            continue;
        }
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(key.as_str())
            .to_string();
        item.insert("link".to_string(), Value::String(proxy_link(public_base_url, &id)));
    }
}

fn proxy_link(public_base_url: &str, content_id: &str) -> String {
    let raw = format!("{public_base_url}/proxy");
    match Url::parse_with_params(&raw, &[("content_id", content_id)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{raw}?content_id={content_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_file_links_and_keeps_folders() {
        let mut doc = json!({
            "status": "ok",
            "data": {
                "children": {
                    "a1": {"id": "a1", "type": "file", "link": "https://store.invalid/dl/a1?token=secret"},
                    "f1": {"id": "f1", "type": "folder"}
                }
            }
        });

        rewrite_child_links(&mut doc, "http://proxy.local:8000");

        let file = &doc["data"]["children"]["a1"];
        assert_eq!(file["link"], "http://proxy.local:8000/proxy?content_id=a1");
        assert_eq!(file["link_original"], "https://store.invalid/dl/a1?token=secret");
        let folder = &doc["data"]["children"]["f1"];
        assert!(folder.get("link").is_none());
        assert_eq!(folder["link_original"], Value::Null);
    }

    #[test]
    fn proxy_link_escapes_ids() {
        assert_eq!(
            proxy_link("http://p", "a b&c"),
            "http://p/proxy?content_id=a+b%26c"
        );
    }

    #[test]
    fn listing_without_children_is_untouched() {
        let mut doc = json!({"status": "error-notFound", "data": {}});
        let before = doc.clone();
        rewrite_child_links(&mut doc, "http://p");
        assert_eq!(doc, before);
    }
}
