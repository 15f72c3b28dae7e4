use axum::{extract::State, Json};
use common_wire::{gateway_status, PaymentPush, SettlementCallback};
use serde_json::json;
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api_error::{ApiError, ApiResult};
use crate::app::{
    DUPLICATE_SETTLEMENTS_TOTAL, PUSH_FAILURES_TOTAL, SETTLEMENTS_APPLIED_TOTAL,
    WEBHOOK_EVENTS_TOTAL,
};
use crate::repo::{self, SettlementOutcome};
use crate::AppState;

/// Keyed one-way digest over the callback identity fields, as issued by the
/// gateway: hex(sha512(order_id || status_code || gross_amount || server_key)).
pub fn expected_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify(callback: &SettlementCallback, server_key: &str) -> bool {
    let expected = expected_signature(
        &callback.order_id,
        &callback.status_code,
        &callback.gross_amount,
        server_key,
    );
    expected
        .as_bytes()
        .ct_eq(callback.signature.as_bytes())
        .unwrap_u8()
        == 1
}

/// Two-phase settlement callback handler.
///
/// Phase 1 records the audit row and verifies the signature; a bad signature
/// is rejected with 401 and never reaches the lifecycle manager. Phase 2 runs
/// after the acknowledgement, on its own task: the gateway retries on missing
/// acks, so internal failures past this point are logged rather than allowed
/// to trigger redundant redeliveries the idempotency guard would discard
/// anyway.
pub async fn handle_gateway_webhook(
    State(state): State<AppState>,
    Json(callback): Json<SettlementCallback>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;

    let is_valid = verify(&callback, &state.config.gateway_server_key);
    let payload = serde_json::to_value(&callback).map_err(ApiError::internal)?;
    let event_id = repo::record_webhook_event(
        &db,
        &callback.order_id,
        &payload,
        &callback.signature,
        is_valid,
    )
    .await
    .map_err(ApiError::internal)?;
    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[if is_valid { "true" } else { "false" }])
        .inc();

    if !is_valid {
        warn!(order_id = %callback.order_id, "rejecting callback with invalid signature");
        return Err(ApiError::Unauthorized {
            code: "invalid_signature",
        });
    }

    info!(
        order_id = %callback.order_id,
        status = %callback.transaction_status,
        "callback verified, acknowledging"
    );
    let worker_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = process_callback(&worker_state, db, event_id, callback).await {
            error!(error = %err, "callback processing failed after acknowledgement");
        }
    });

    Ok(Json(json!({ "success": true })))
}

/// Phase 2: the idempotent transactional update plus dispatch. Independently
/// retryable; every step past the settlement commit is failure-tolerant.
async fn process_callback(
    state: &AppState,
    db: PgPool,
    event_id: Uuid,
    callback: SettlementCallback,
) -> Result<(), repo::RepoError> {
    if callback.is_successful() {
        let amount = parse_gross_amount(&callback.gross_amount);
        let outcome = repo::apply_settlement(
            &db,
            &callback.order_id,
            &callback.settlement_id,
            amount,
            callback.payer_name.as_deref(),
        )
        .await?;

        match outcome {
            SettlementOutcome::Applied => {
                SETTLEMENTS_APPLIED_TOTAL.inc();
                repo::mark_webhook_processed(&db, event_id).await?;
                dispatch_push(state, &db, &callback, amount).await;
            }
            SettlementOutcome::AlreadyPaid { settlement_id } => {
                DUPLICATE_SETTLEMENTS_TOTAL.inc();
                repo::mark_webhook_processed(&db, event_id).await?;
                info!(
                    order_id = %callback.order_id,
                    existing = settlement_id.as_deref().unwrap_or("-"),
                    "duplicate settlement callback, no-op"
                );
            }
            SettlementOutcome::NotPending(status) => {
                warn!(
                    order_id = %callback.order_id,
                    status = status.as_str(),
                    "settlement arrived for terminal order, no-op"
                );
            }
        }
        return Ok(());
    }

    match callback.transaction_status.as_str() {
        gateway_status::EXPIRE | gateway_status::DENY => {
            if force_expire(&db, &callback.order_id).await? {
                info!(order_id = %callback.order_id, "order expired by gateway callback");
            }
        }
        gateway_status::CANCEL => {
            if repo::cancel_order(&db, &callback.order_id).await? {
                info!(order_id = %callback.order_id, "order cancelled by gateway callback");
            }
        }
        other => {
            info!(order_id = %callback.order_id, status = other, "ignoring non-final callback status");
        }
    }
    Ok(())
}

/// Gateway-driven expiry ignores the local clock; the gateway already decided.
async fn force_expire(db: &PgPool, order_id: &str) -> Result<bool, repo::RepoError> {
    let result =
        sqlx::query("UPDATE orders SET status = 'expired' WHERE order_id = $1 AND status = 'pending'")
            .bind(order_id)
            .execute(db)
            .await?;
    Ok(result.rows_affected() > 0)
}

async fn dispatch_push(state: &AppState, db: &PgPool, callback: &SettlementCallback, amount: i64) {
    let merchant = match repo::get_order_fresh(db, &callback.order_id).await {
        Ok(Some(order)) => match repo::get_active_merchant(db, &order.merchant_id).await {
            Ok(merchant) => merchant,
            Err(err) => {
                warn!(error = %err, "merchant lookup failed for push dispatch");
                return;
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, "order lookup failed for push dispatch");
            return;
        }
    };

    let Some(merchant) = merchant else {
        warn!(order_id = %callback.order_id, "no active merchant for settled order, skipping push");
        return;
    };
    let Some(token) = merchant.push_token.as_deref() else {
        warn!(merchant_id = %merchant.merchant_id, "merchant has no push address, skipping push");
        return;
    };

    let push = PaymentPush::settled(
        callback.settlement_id.clone(),
        Some(callback.order_id.clone()),
        amount,
        callback.payer_name.clone(),
    );
    if let Err(err) = state.push.send(token, &push).await {
        PUSH_FAILURES_TOTAL.inc();
        warn!(
            merchant_id = %merchant.merchant_id,
            error = %err,
            "push dispatch failed; device will reconcile via status query"
        );
    }
}

/// The gateway reports amounts as decimal strings ("15000.00"); orders carry
/// integer minor units.
fn parse_gross_amount(raw: &str) -> i64 {
    raw.split('.').next().and_then(|s| s.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(signature: String) -> SettlementCallback {
        SettlementCallback {
            order_id: "ORDER-12345678-ABCDE".into(),
            settlement_id: "TX-1".into(),
            status_code: "200".into(),
            gross_amount: "15000.00".into(),
            transaction_status: "settlement".into(),
            fraud_status: None,
            signature,
            payer_name: None,
        }
    }

    #[test]
    fn signature_matches_known_construction() {
        let sig = expected_signature("ORDER-1", "200", "15000.00", "secret");
        // sha512 hex digest is 128 chars and stable for fixed input
        assert_eq!(sig.len(), 128);
        assert_eq!(sig, expected_signature("ORDER-1", "200", "15000.00", "secret"));
        assert_ne!(sig, expected_signature("ORDER-2", "200", "15000.00", "secret"));
        assert_ne!(sig, expected_signature("ORDER-1", "200", "15000.00", "other"));
    }

    #[test]
    fn verify_accepts_only_the_expected_signature() {
        let key = "server-key";
        let good = expected_signature("ORDER-12345678-ABCDE", "200", "15000.00", key);
        assert!(verify(&callback(good), key));
        assert!(!verify(&callback("deadbeef".repeat(16)), key));
        // same length, one byte off
        let mut tampered = expected_signature("ORDER-12345678-ABCDE", "200", "15000.00", key);
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(!verify(&callback(tampered), key));
    }

    #[test]
    fn gross_amount_drops_decimal_fraction() {
        assert_eq!(parse_gross_amount("15000.00"), 15000);
        assert_eq!(parse_gross_amount("15000"), 15000);
        assert_eq!(parse_gross_amount("garbage"), 0);
    }
}
