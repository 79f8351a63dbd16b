mod support;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use inkbridge::infra::http::{REQUEST_ID_HEADER, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use support::{TestContext, post};

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_reports_no_content() {
    let ctx = TestContext::new().await;
    let (status, body) = send(build_router(ctx.api_state()), get("/api/health")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn categories_include_display_names_and_counts() {
    let ctx = TestContext::new().await;
    ctx.save(post("Rust Notes", "body", &["tech"])).await;

    let (status, body) = send(build_router(ctx.api_state()), get("/api/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], json!(false));

    let tech = body["categories"]
        .as_array()
        .expect("categories array")
        .iter()
        .find(|category| category["slug"] == "tech")
        .expect("tech listed");
    assert_eq!(tech["display_name"], "技术");
    assert_eq!(tech["post_count"], 1);
}

#[tokio::test]
async fn post_lookup_follows_aliases() {
    let ctx = TestContext::new().await;
    let original = ctx.save(post("First Title", "body", &["life"])).await;
    let mut edit = post("Second Title", "body", &["life"]);
    edit.id = Some(original.id);
    ctx.save(edit).await;

    let router = build_router(ctx.api_state());
    let (status, body) = send(router.clone(), get("/api/posts/first-title")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["slug"], "second-title");
    assert_eq!(body["redirected_from"], "first-title");
    assert_eq!(body["categories"], json!(["life"]));

    let (status, body) = send(router, get("/api/posts/second-title")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("redirected_from").is_none());
}

#[tokio::test]
async fn unknown_post_is_404_with_error_body() {
    let ctx = TestContext::new().await;
    let (status, body) = send(build_router(ctx.api_state()), get("/api/posts/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn sync_status_starts_idle() {
    let ctx = TestContext::new().await;
    let (status, body) = send(build_router(ctx.api_state()), get("/api/sync/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["pending_operations"], 0);
    assert_eq!(body["last_sync"], Value::Null);
}

#[tokio::test]
async fn sync_rejects_unknown_direction() {
    let ctx = TestContext::new().await;
    let (status, body) = send(
        build_router(ctx.api_state()),
        post_json("/api/sync", json!({ "direction": "sideways" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn sync_to_local_returns_report() {
    let ctx = TestContext::new().await;
    ctx.save(post("Mirrored", "body", &["tech"])).await;

    let (status, body) = send(
        build_router(ctx.api_state()),
        post_json("/api/sync", json!({ "direction": "to-local" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 1);
    assert!(
        ctx.dir
            .path()
            .join("mirror/content/posts/tech/mirrored.md")
            .is_file()
    );
}

#[tokio::test]
async fn dedupe_dry_run_reports_groups() {
    let ctx = TestContext::new().await;
    ctx.save(post("Same Story", "identical body text", &["tech"]))
        .await;
    ctx.save(post("Same Story", "identical body text", &["tech"]))
        .await;

    let (status, body) = send(
        build_router(ctx.api_state()),
        post_json("/api/admin/dedupe", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["groups"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["removed"], 0);
}

#[tokio::test]
async fn replica_push_without_target_is_a_configuration_error() {
    let ctx = TestContext::new().await;
    let (status, body) = send(
        build_router(ctx.api_state()),
        post_json("/api/admin/sync-to-prod", json!({ "tables": ["posts"] })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "not_configured");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let ctx = TestContext::new().await;
    let router = build_router(ctx.api_state());

    let response = router
        .clone()
        .oneshot(get("/api/posts/missing"))
        .await
        .expect("response");
    let generated = response
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .expect("generated request id");
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let request = Request::builder()
        .uri("/api/health")
        .header(&REQUEST_ID_HEADER, "trace-42")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("response");
    assert_eq!(
        response.headers().get(&REQUEST_ID_HEADER).map(|v| v.as_bytes()),
        Some(&b"trace-42"[..])
    );
}
