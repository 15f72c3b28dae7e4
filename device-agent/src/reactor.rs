//! Device settlement reactor: turns a delivered push into one locally
//! persisted settlement, one announcement, and one silent notification.
//! Runs off the UI context; UI-visible effects travel over channels.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common_wire::PaymentPush;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::announcer::AnnouncerHandle;
use crate::audio::{Notifier, WakeSource};
use crate::speech::format_rupiah;
use crate::store::{SettlementRecord, SettlementStore};

/// Ceiling on the wake hold: bounds battery impact of a stuck sequence.
pub const WAKE_CEILING: Duration = Duration::from_secs(20);

/// Notice published when a settlement for a tracked order lands; the client
/// order state machine consumes these.
#[derive(Debug, Clone)]
pub struct SettlementNotice {
    pub order_id: String,
    pub settlement_id: String,
    pub amount: i64,
}

pub struct SettlementReactor {
    store: Arc<dyn SettlementStore>,
    announcer: AnnouncerHandle,
    notifier: Arc<dyn Notifier>,
    wake: Arc<dyn WakeSource>,
    settled_tx: broadcast::Sender<SettlementNotice>,
}

impl SettlementReactor {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        announcer: AnnouncerHandle,
        notifier: Arc<dyn Notifier>,
        wake: Arc<dyn WakeSource>,
    ) -> Self {
        let (settled_tx, _) = broadcast::channel(16);
        Self {
            store,
            announcer,
            notifier,
            wake,
            settled_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementNotice> {
        self.settled_tx.subscribe()
    }

    /// Entry point for a dispatched push. Idempotent per settlement id: a
    /// redelivery neither re-persists nor re-announces, keeping the
    /// user-visible settlement exactly-once per order.
    pub async fn on_settlement_pushed(&self, push: PaymentPush) {
        if !push.is_settled() {
            debug!(kind = %push.kind, status = %push.status, "ignoring non-settlement push");
            return;
        }

        let _wake = self.wake.acquire(WAKE_CEILING);

        let record = SettlementRecord {
            settlement_id: push.settlement_id.clone(),
            amount: push.amount,
            order_id: push.order_id.clone(),
            payer_name: push.payer_name.clone(),
            received_at: Utc::now(),
            synced: false,
        };
        if !self.store.insert_if_absent(record).await {
            info!(settlement_id = %push.settlement_id, "duplicate push delivery, no-op");
            return;
        }

        if let Some(order_id) = &push.order_id {
            self.store
                .mark_order_paid(order_id, &push.settlement_id)
                .await;
            // Nobody listening is fine; the session may not be tracking.
            let _ = self.settled_tx.send(SettlementNotice {
                order_id: order_id.clone(),
                settlement_id: push.settlement_id.clone(),
                amount: push.amount,
            });
        }

        self.announcer.announce(push.amount).await;
        self.notifier.notify_silent(
            "Pembayaran Diterima",
            &format!(
                "Pembayaran sebesar Rp {} telah berhasil diterima",
                format_rupiah(push.amount)
            ),
        );
        info!(
            settlement_id = %push.settlement_id,
            amount = push.amount,
            "settlement processed on device"
        );
    }
}
