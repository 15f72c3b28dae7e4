use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api_error::ApiError;
use crate::config::ServiceConfig;
use crate::gateway::QrisGateway;
use crate::order_handlers::{cancel_order, create_order, order_status, update_push_token};
use crate::push::PushSender;
use crate::webhook::handle_gateway_webhook;

pub static SERVICE_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("webhook_events_total", "Inbound settlement callbacks by signature validity"),
        &["valid"],
    )
    .unwrap();
    SERVICE_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub static SETTLEMENTS_APPLIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("settlements_applied_total", "Orders transitioned to paid").unwrap();
    SERVICE_REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DUPLICATE_SETTLEMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "duplicate_settlements_total",
        "Settlement callbacks discarded by the idempotency guard",
    )
    .unwrap();
    SERVICE_REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PUSH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("push_dispatch_failures_total", "Failed push dispatches").unwrap();
    SERVICE_REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ORDERS_EXPIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("orders_expired_total", "Orders expired by the sweep").unwrap();
    SERVICE_REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    )
    .unwrap();
    SERVICE_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub config: Arc<ServiceConfig>,
    pub gateway: Arc<dyn QrisGateway>,
    pub push: Arc<dyn PushSender>,
}

impl AppState {
    pub fn db(&self) -> Result<PgPool, ApiError> {
        self.db
            .clone()
            .ok_or_else(|| ApiError::internal("database not configured"))
    }
}

pub async fn http_error_metrics(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        HTTP_ERRORS_TOTAL
            .with_label_values(&["settlement-service", code, status.as_str()])
            .inc();
    }
    resp
}

async fn metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder
        .encode(&SERVICE_REGISTRY.gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/api/qris/generate", post(create_order))
        .route("/api/qris/status/:order_id", get(order_status))
        .route("/api/qris/cancel", post(cancel_order))
        .route("/api/merchant/push-token", post(update_push_token))
        .route("/webhook/payment", post(handle_gateway_webhook))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics))
        .layer(cors)
}
