use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use settlement_service::gateway::StubGateway;
use settlement_service::push::RecordingPushSender;
use settlement_service::{build_router, AppState, ServiceConfig};
use tower::util::ServiceExt;

fn app() -> axum::Router {
    let state = AppState {
        db: None,
        config: Arc::new(ServiceConfig::for_tests("test-server-key")),
        gateway: Arc::new(StubGateway::new()),
        push: Arc::new(RecordingPushSender::default()),
    };
    build_router(state)
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), 16 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let resp = app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn amount_below_minimum_returns_validation_envelope() {
    let body = serde_json::json!({ "merchant_id": "M-1", "amount": 500 }).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/api/qris/generate")
        .header("content-type", "application/json")
        .header("X-API-Key", "whatever")
        .body(Body::from(body))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("validation_error")
    );
    let text = body_text(resp).await;
    assert!(text.contains("\"code\":\"validation_error\""), "body: {text}");
    assert!(text.contains("1000"), "message should name the bound: {text}");
}

#[tokio::test]
async fn amount_above_maximum_returns_validation_envelope() {
    let body = serde_json::json!({ "merchant_id": "M-1", "amount": 20_000_000 }).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/api/qris/generate")
        .header("content-type", "application/json")
        .header("X-API-Key", "whatever")
        .body(Body::from(body))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("validation_error")
    );
}
