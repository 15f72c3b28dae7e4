use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Duration;
use common_wire::{
    CancelOrderRequest, CreateOrderRequest, OrderResponse, OrderStatusResponse, PushTokenRequest,
};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::api_error::{ApiError, ApiResult};
use crate::repo::{self, Merchant};
use crate::AppState;

/// Device-facing routes authenticate with the merchant's api key, carried on
/// the X-API-Key header.
async fn require_merchant(db: &PgPool, headers: &HeaderMap) -> ApiResult<Merchant> {
    let api_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized {
            code: "missing_api_key",
        })?;
    repo::get_merchant_by_api_key(db, api_key)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::Unauthorized {
            code: "invalid_api_key",
        })
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let cfg = &state.config;
    if req.amount < cfg.min_amount || req.amount > cfg.max_amount {
        return Err(ApiError::validation(format!(
            "amount must be between {} and {}",
            cfg.min_amount, cfg.max_amount
        )));
    }

    let db = state.db()?;
    let merchant = require_merchant(&db, &headers).await?;
    if merchant.merchant_id != req.merchant_id {
        return Err(ApiError::not_found("merchant_not_found"));
    }

    let order_id = repo::new_order_id();
    info!(order_id, amount = req.amount, "requesting gateway charge");

    // Nothing is persisted until the gateway accepts the charge.
    let charge = state
        .gateway
        .charge(&order_id, req.amount)
        .await
        .map_err(|err| ApiError::gateway(err.to_string()))?;

    let order = repo::insert_order(
        &db,
        &order_id,
        &merchant.merchant_id,
        req.amount,
        &charge.qr_payload,
        Duration::seconds(cfg.order_validity_secs),
    )
    .await
    .map_err(ApiError::internal)?;

    let status = order.status();
    Ok(Json(OrderResponse {
        order_id: order.order_id,
        qr_payload: order.qr_payload,
        amount: order.amount,
        expires_at: order.expires_at,
        status,
    }))
}

pub async fn order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderStatusResponse>> {
    let db = state.db()?;
    let merchant = require_merchant(&db, &headers).await?;

    let order = repo::get_order_fresh(&db, &order_id)
        .await
        .map_err(ApiError::internal)?
        .filter(|order| order.merchant_id == merchant.merchant_id)
        .ok_or(ApiError::not_found("order_not_found"))?;

    let status = order.status();
    Ok(Json(OrderStatusResponse {
        order_id: order.order_id,
        status,
        amount: order.amount,
        created_at: order.created_at,
        expires_at: order.expires_at,
        paid_at: order.paid_at,
    }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CancelOrderRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    require_merchant(&db, &headers).await?;

    let cancelled = repo::cancel_order(&db, &req.order_id)
        .await
        .map_err(ApiError::internal)?;
    if cancelled {
        // Best-effort upstream cancel; the local transition already happened.
        if let Err(err) = state.gateway.cancel(&req.order_id).await {
            warn!(order_id = %req.order_id, error = %err, "gateway cancel failed");
        }
    }
    Ok(Json(json!({ "success": true, "cancelled": cancelled })))
}

pub async fn update_push_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PushTokenRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let merchant = require_merchant(&db, &headers).await?;
    if merchant.merchant_id != req.merchant_id {
        return Err(ApiError::not_found("merchant_not_found"));
    }

    let updated = repo::update_push_token(&db, &req.merchant_id, &req.push_token)
        .await
        .map_err(ApiError::internal)?;
    if !updated {
        return Err(ApiError::not_found("merchant_not_found"));
    }
    info!(merchant_id = %req.merchant_id, "push token rotated");
    Ok(Json(json!({ "success": true })))
}
