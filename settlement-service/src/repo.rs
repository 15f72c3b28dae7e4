use chrono::{DateTime, Duration, Utc};
use common_wire::OrderStatus;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("merchant not found")]
    MerchantNotFound,
    #[error("order not found")]
    OrderNotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
pub struct Merchant {
    pub merchant_id: String,
    pub api_key: String,
    pub push_token: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Order {
    pub order_id: String,
    pub merchant_id: String,
    pub amount: i64,
    pub qr_payload: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub settlement_id: Option<String>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::parse(&self.status).unwrap_or(OrderStatus::Pending)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct Settlement {
    pub settlement_id: String,
    pub order_id: String,
    pub amount: i64,
    pub payer_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Result of applying a verified settlement callback to the order store.
#[derive(Debug, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The order transitioned pending -> paid in this call.
    Applied,
    /// The order was already paid; the existing settlement reference is
    /// returned and nothing was written.
    AlreadyPaid { settlement_id: Option<String> },
    /// The order reached a different terminal state first; duplicate external
    /// retries land here and are no-ops, never errors.
    NotPending(OrderStatus),
}

const ORDER_COLUMNS: &str = "order_id, merchant_id, amount, qr_payload, status, \
     created_at, expires_at, paid_at, settlement_id";

/// Gateway-facing order identifier, capped well under the 50-char limit.
pub fn new_order_id() -> String {
    let millis = Utc::now().timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(8)..];
    let random = Uuid::new_v4().simple().to_string()[..5].to_uppercase();
    format!("ORDER-{tail}-{random}")
}

pub async fn get_active_merchant(
    db: &PgPool,
    merchant_id: &str,
) -> Result<Option<Merchant>, RepoError> {
    let rec = sqlx::query_as::<_, Merchant>(
        "SELECT merchant_id, api_key, push_token, is_active FROM merchants \
         WHERE merchant_id = $1 AND is_active = TRUE",
    )
    .bind(merchant_id)
    .fetch_optional(db)
    .await?;
    Ok(rec)
}

pub async fn get_merchant_by_api_key(
    db: &PgPool,
    api_key: &str,
) -> Result<Option<Merchant>, RepoError> {
    let rec = sqlx::query_as::<_, Merchant>(
        "SELECT merchant_id, api_key, push_token, is_active FROM merchants \
         WHERE api_key = $1 AND is_active = TRUE",
    )
    .bind(api_key)
    .fetch_optional(db)
    .await?;
    Ok(rec)
}

pub async fn update_push_token(
    db: &PgPool,
    merchant_id: &str,
    push_token: &str,
) -> Result<bool, RepoError> {
    let result = sqlx::query("UPDATE merchants SET push_token = $2 WHERE merchant_id = $1")
        .bind(merchant_id)
        .bind(push_token)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_order(
    db: &PgPool,
    order_id: &str,
    merchant_id: &str,
    amount: i64,
    qr_payload: &str,
    validity: Duration,
) -> Result<Order, RepoError> {
    let expires_at = Utc::now() + validity;
    let rec = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (order_id, merchant_id, amount, qr_payload, status, expires_at) \
         VALUES ($1, $2, $3, $4, 'pending', $5) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order_id)
    .bind(merchant_id)
    .bind(amount)
    .bind(qr_payload)
    .bind(expires_at)
    .fetch_one(db)
    .await?;
    Ok(rec)
}

/// Fetch an order, applying the expiry check lazily: a read never reports
/// `pending` for an order whose expiry has passed.
pub async fn get_order_fresh(db: &PgPool, order_id: &str) -> Result<Option<Order>, RepoError> {
    let Some(order) = fetch_order(db, order_id).await? else {
        return Ok(None);
    };
    if order.status() == OrderStatus::Pending && order.expires_at < Utc::now() {
        expire_if_due(db, order_id).await?;
        return fetch_order(db, order_id).await.map_err(Into::into);
    }
    Ok(Some(order))
}

async fn fetch_order(db: &PgPool, order_id: &str) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(db)
    .await
}

/// Idempotent settlement application. The settlement row and the order status
/// update commit in a single transaction; the pending guard is re-checked by
/// the UPDATE itself, inside the transaction, so two concurrent callbacks for
/// the same order serialize on the row and the loser observes committed state.
pub async fn apply_settlement(
    db: &PgPool,
    order_id: &str,
    settlement_id: &str,
    amount: i64,
    payer_name: Option<&str>,
) -> Result<SettlementOutcome, RepoError> {
    let mut tx = db.begin().await?;

    let updated: Option<(String,)> = sqlx::query_as(
        "UPDATE orders SET status = 'paid', paid_at = now(), settlement_id = $2 \
         WHERE order_id = $1 AND status = 'pending' \
         RETURNING order_id",
    )
    .bind(order_id)
    .bind(settlement_id)
    .fetch_optional(&mut *tx)
    .await?;

    if updated.is_none() {
        // No transition happened; the transaction holds nothing worth keeping.
        drop(tx);
        let Some(order) = fetch_order(db, order_id).await? else {
            return Err(RepoError::OrderNotFound);
        };
        return Ok(match order.status() {
            OrderStatus::Paid => SettlementOutcome::AlreadyPaid {
                settlement_id: order.settlement_id,
            },
            other => SettlementOutcome::NotPending(other),
        });
    }

    sqlx::query(
        "INSERT INTO settlements (settlement_id, order_id, amount, payer_name) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (settlement_id) DO NOTHING",
    )
    .bind(settlement_id)
    .bind(order_id)
    .bind(amount)
    .bind(payer_name)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(order_id, settlement_id, amount, "settlement applied");
    Ok(SettlementOutcome::Applied)
}

/// Transition a single order pending -> expired when past its expiry.
pub async fn expire_if_due(db: &PgPool, order_id: &str) -> Result<bool, RepoError> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'expired' \
         WHERE order_id = $1 AND status = 'pending' AND expires_at < now()",
    )
    .bind(order_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Background sweep over all due pending orders. Guarded on `pending`, so a
/// concurrently committed settlement can never be overwritten.
pub async fn expire_due(db: &PgPool) -> Result<u64, RepoError> {
    let result =
        sqlx::query("UPDATE orders SET status = 'expired' WHERE status = 'pending' AND expires_at < now()")
            .execute(db)
            .await?;
    Ok(result.rows_affected())
}

/// Best-effort cancellation: pending -> cancelled, no-op when terminal.
pub async fn cancel_order(db: &PgPool, order_id: &str) -> Result<bool, RepoError> {
    let result =
        sqlx::query("UPDATE orders SET status = 'cancelled' WHERE order_id = $1 AND status = 'pending'")
            .bind(order_id)
            .execute(db)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Retention sweep: physically drops terminal orders older than the window.
pub async fn purge_old_orders(db: &PgPool, older_than_days: i64) -> Result<u64, RepoError> {
    let cutoff = Utc::now() - Duration::days(older_than_days);
    let result =
        sqlx::query("DELETE FROM orders WHERE status <> 'pending' AND created_at < $1")
            .bind(cutoff)
            .execute(db)
            .await?;
    Ok(result.rows_affected())
}

/// Append-only audit row for an inbound callback attempt, recorded before any
/// business logic, invalid and duplicate deliveries included. Returns the row
/// id so the processed flag can later be tied to this exact attempt.
pub async fn record_webhook_event(
    db: &PgPool,
    order_id: &str,
    payload: &serde_json::Value,
    signature: &str,
    is_valid: bool,
) -> Result<Uuid, RepoError> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO webhook_events (id, order_id, payload, signature, is_valid) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(payload)
    .bind(signature)
    .bind(is_valid)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn mark_webhook_processed(db: &PgPool, event_id: Uuid) -> Result<(), RepoError> {
    let result = sqlx::query("UPDATE webhook_events SET processed = TRUE WHERE id = $1")
        .bind(event_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        warn!(%event_id, "webhook event row missing when marking processed");
    }
    Ok(())
}

/// Idempotent schema bootstrap, shared by startup and the DB-backed tests.
pub async fn ensure_schema(db: &PgPool) -> Result<(), RepoError> {
    let statements = [
        r#"CREATE TABLE IF NOT EXISTS merchants (
            merchant_id TEXT PRIMARY KEY,
            api_key TEXT NOT NULL,
            push_token TEXT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
        r#"CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            merchant_id TEXT NOT NULL,
            amount BIGINT NOT NULL,
            qr_payload TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ NOT NULL,
            paid_at TIMESTAMPTZ NULL,
            settlement_id TEXT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS settlements (
            settlement_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            amount BIGINT NOT NULL,
            payer_name TEXT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
        r#"CREATE TABLE IF NOT EXISTS webhook_events (
            id UUID PRIMARY KEY,
            order_id TEXT NOT NULL,
            payload JSONB NOT NULL,
            signature TEXT NOT NULL,
            is_valid BOOLEAN NOT NULL,
            processed BOOLEAN NOT NULL DEFAULT FALSE,
            received_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    ];
    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_fit_gateway_limit() {
        let id = new_order_id();
        assert!(id.starts_with("ORDER-"));
        assert!(id.len() <= 50, "id too long: {id}");
        assert_ne!(new_order_id(), new_order_id());
    }
}
