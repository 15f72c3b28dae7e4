use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::app::ORDERS_EXPIRED_TOTAL;
use crate::repo;

/// Background pending -> expired sweep. Runs independently of settlement;
/// the repo guard on `pending` means a concurrently committed settlement
/// always wins over a would-be expiry.
pub fn spawn_expiry_sweeper(db: PgPool, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match repo::expire_due(&db).await {
                Ok(0) => {}
                Ok(count) => {
                    ORDERS_EXPIRED_TOTAL.inc_by(count);
                    debug!(count, "expired due orders");
                }
                Err(err) => {
                    warn!(error = %err, "expiry sweep failed");
                }
            }
        }
    });
}

/// Retention sweep over old terminal rows, run far less often.
pub fn spawn_retention_sweeper(db: PgPool, retention_days: i64) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(24 * 60 * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match repo::purge_old_orders(&db, retention_days).await {
                Ok(count) if count > 0 => debug!(count, "purged old orders"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "retention sweep failed"),
            }
        }
    });
}
