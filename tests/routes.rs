mod common;

use common::{body_bytes, body_json, Canned, Harness};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode};
use serde_json::json;

#[tokio::test]
async fn listing_links_point_at_proxy() {
    let h = Harness::new().await;
    h.upstream.route(
        "/contents/root",
        Canned::json(json!({
            "status": "ok",
            "data": {
                "id": "root",
                "type": "folder",
                "children": {
                    "c1": {"id": "c1", "type": "file", "link": "https://store.test/c1?token=t"},
                    "c2": {"id": "c2", "type": "folder"}
                }
            }
        })),
    );

    let response = h.get("/get_content?content_id=root&page_size=50").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let child = &body["data"]["children"]["c1"];
    assert_eq!(child["link"], "http://proxy.test:8000/proxy?content_id=c1");
    assert_eq!(child["link_original"], "https://store.test/c1?token=t");
    assert!(body["data"]["children"]["c2"].get("link").is_none());

    let sent = h.upstream.requests_to("/contents/root");
    assert!(sent[0].query.contains(&("pageSize".to_string(), "50".to_string())));
    assert!(sent[0].query.contains(&("sortField".to_string(), "createTime".to_string())));
}

#[tokio::test]
async fn listing_upstream_error_is_mirrored() {
    let h = Harness::new().await;
    h.upstream
        .route("/contents/busy", Canned::new(StatusCode::TOO_MANY_REQUESTS, ""));

    let response = h.get("/get_content?content_id=busy").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn secondary_resolve_prefers_listing() {
    let h = Harness::new().await;
    h.upstream.route(
        "/list/L1",
        Canned::json(json!({"id": "L1", "files": [{"id": "f1"}]})),
    );
    h.upstream
        .route("/api/file/L1/info", Canned::json(json!({"id": "L1"})));

    let body = body_json(h.get("/pixeldrain/resolve?content_id=L1").await).await;

    assert_eq!(body["type"], "list");
    assert_eq!(body["data"]["files"][0]["id"], "f1");
    assert_eq!(h.upstream.hits("/api/list/L1"), 1);
    assert_eq!(h.upstream.hits("/api/file/L1/info"), 0);
}

#[tokio::test]
async fn secondary_resolve_skips_empty_listing() {
    let h = Harness::new().await;
    h.upstream
        .route("/api/list/F1", Canned::json(json!({"id": "F1", "files": []})));
    h.upstream.route(
        "/api/file/F1/info",
        Canned::json(json!({"id": "F1", "name": "a.mp4"})),
    );

    let body = body_json(h.get("/pixeldrain/resolve?content_id=F1").await).await;

    assert_eq!(body, json!({"type": "file", "data": {"id": "F1", "name": "a.mp4"}}));
}

#[tokio::test]
async fn secondary_resolve_rejects_unparseable_json() {
    let h = Harness::new().await;
    h.upstream
        .route("/api/file/X/info", Canned::new(StatusCode::OK, "<html>"));

    let response = h.get("/pixeldrain/resolve?content_id=X").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn secondary_info_mirrors_upstream_status() {
    let h = Harness::new().await;
    h.upstream
        .route("/api/file/i1/info", Canned::json(json!({"id": "i1", "size": 10})));
    h.upstream
        .route("/file/i2/info", Canned::new(StatusCode::FORBIDDEN, ""));

    let ok = body_json(h.get("/pixeldrain/info?file_id=i1").await).await;
    assert_eq!(ok["size"], 10);

    let denied = h.get("/pixeldrain/info?file_id=i2").await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn secondary_thumbnail_and_file_stream() {
    let h = Harness::new().await;
    h.upstream
        .route("/file/t1/thumbnail", Canned::new(StatusCode::OK, "thumb"));
    h.upstream.route(
        "/file/t1",
        Canned::new(StatusCode::OK, "payload").header(CONTENT_TYPE, "video/mp4"),
    );

    let thumb = h.get("/pixeldrain/thumbnail?file_id=t1&width=64").await;
    assert_eq!(thumb.status(), StatusCode::OK);
    assert_eq!(thumb.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(&body_bytes(thumb).await[..], b"thumb");
    let sent = h.upstream.requests_to("/file/t1/thumbnail");
    assert!(sent[0].query.contains(&("width".to_string(), "64".to_string())));
    assert!(sent[0].query.contains(&("height".to_string(), "128".to_string())));

    let file = h.get("/pixeldrain/file?file_id=t1").await;
    assert_eq!(file.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(&body_bytes(file).await[..], b"payload");

    let missing = h.get("/pixeldrain/file?file_id=nothing").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_requests() {
    let h = Harness::new().await;

    assert_eq!(h.get("/proxy").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        h.get("/proxy?content_id=a&max_width=wide").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(h.get("/pixeldrain/info").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.get("/elsewhere").await.status(), StatusCode::NOT_FOUND);

    let post = h
        .get_with(Request::builder().method(Method::POST).uri("/proxy?content_id=a"))
        .await;
    assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);

    let preflight = h
        .get_with(Request::builder().method(Method::OPTIONS).uri("/proxy"))
        .await;
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    assert!(h.upstream.requests_to("/contents/a").is_empty());
}

#[tokio::test]
async fn escaped_ids_stay_inside_upstream_paths() {
    let h = Harness::new().await;
    let secret = Canned::json(json!({"status": "ok", "data": {"token": "account-secret"}}));
    h.upstream.route("/accounts/me", secret.clone());
    h.upstream.route("/api/accounts/me", secret);

    let uris = [
        "/get_content?content_id=..%2Faccounts%2Fme",
        "/proxy?content_id=..%2Faccounts%2Fme",
        "/pixeldrain/resolve?content_id=..%2F..%2Faccounts%2Fme",
        "/pixeldrain/info?file_id=..%2F..%2Faccounts%2Fme",
        "/pixeldrain/thumbnail?file_id=..%2F..%2Faccounts%2Fme",
        "/pixeldrain/file?file_id=..%2Faccounts%2Fme",
    ];
    for uri in uris {
        let response = h.get(uri).await;
        assert_ne!(response.status(), StatusCode::OK, "{uri}");
        let body = body_bytes(response).await;
        assert!(!String::from_utf8_lossy(&body).contains("account-secret"), "{uri}");
    }

    assert_eq!(h.upstream.hits("/accounts/me"), 0);
    assert_eq!(h.upstream.hits("/api/accounts/me"), 0);
    // the id travelled as one escaped segment
    assert_eq!(h.upstream.hits("/contents/..%2Faccounts%2Fme"), 2);
}

#[tokio::test]
async fn dot_segment_ids_are_rejected() {
    let h = Harness::new().await;

    for uri in [
        "/get_content?content_id=..",
        "/proxy?content_id=.",
        "/pixeldrain/resolve?content_id=..",
        "/pixeldrain/info?file_id=%2E%2E",
        "/pixeldrain/thumbnail?file_id=..",
        "/pixeldrain/file?file_id=..",
    ] {
        assert_eq!(h.get(uri).await.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}
