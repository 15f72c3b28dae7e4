//! Client-side order state machine: at most one in-flight order, a
//! one-second countdown to expiry, and transitions driven by user actions or
//! an observed settlement. All state lives behind watch channels; the session
//! is the single owner of its mutations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reactor::SettlementNotice;
use crate::speech::format_rupiah;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct OrderApiError {
    pub message: String,
}

impl OrderApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The slice of an order the device tracks while it is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order_id: String,
    pub qr_payload: String,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
}

/// Client to the settlement service's order API.
#[async_trait::async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(&self, amount: i64) -> Result<OrderView, OrderApiError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), OrderApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderUiState {
    Idle,
    Loading,
    Ready(OrderView),
    Expired,
    Error(String),
    Paid,
}

pub struct OrderSession {
    api: Arc<dyn OrderApi>,
    min_amount: i64,
    state_tx: Arc<watch::Sender<OrderUiState>>,
    state_rx: watch::Receiver<OrderUiState>,
    remaining_tx: Arc<watch::Sender<i64>>,
    remaining_rx: watch::Receiver<i64>,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

impl OrderSession {
    pub fn new(api: Arc<dyn OrderApi>, min_amount: i64) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(OrderUiState::Idle);
        let (remaining_tx, remaining_rx) = watch::channel(0);
        Arc::new(Self {
            api,
            min_amount,
            state_tx: Arc::new(state_tx),
            state_rx,
            remaining_tx: Arc::new(remaining_tx),
            remaining_rx,
            countdown: Mutex::new(None),
        })
    }

    pub fn state(&self) -> OrderUiState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<OrderUiState> {
        self.state_rx.clone()
    }

    pub fn remaining_seconds(&self) -> i64 {
        *self.remaining_rx.borrow()
    }

    pub fn watch_remaining(&self) -> watch::Receiver<i64> {
        self.remaining_rx.clone()
    }

    /// Request a new order. Starting a fresh cycle from Idle, Error or a
    /// terminal Paid/Expired state cancels whatever countdown was left over.
    pub async fn generate(&self, amount: i64) {
        self.stop_countdown();
        if amount < self.min_amount {
            self.state_tx.send_replace(OrderUiState::Error(format!(
                "Minimal pembayaran Rp {}",
                format_rupiah(self.min_amount)
            )));
            return;
        }

        self.state_tx.send_replace(OrderUiState::Loading);
        match self.api.create_order(amount).await {
            Ok(view) => {
                info!(order_id = %view.order_id, amount, "order ready, starting countdown");
                self.start_countdown(view.expires_at);
                self.state_tx.send_replace(OrderUiState::Ready(view));
            }
            Err(err) => {
                warn!(error = %err, "order creation failed");
                self.state_tx.send_replace(OrderUiState::Error(err.message));
            }
        }
    }

    /// Cancel the in-flight order: stops the countdown, best-effort server
    /// cancellation, back to Idle. No-op outside Ready.
    pub async fn cancel(&self) {
        let OrderUiState::Ready(view) = self.state() else {
            return;
        };
        self.stop_countdown();
        if let Err(err) = self.api.cancel_order(&view.order_id).await {
            warn!(order_id = %view.order_id, error = %err, "server-side cancel failed");
        }
        self.remaining_tx.send_replace(0);
        self.state_tx.send_replace(OrderUiState::Idle);
    }

    /// Back to Idle from any state, cancelling the countdown task.
    pub fn reset(&self) {
        self.stop_countdown();
        self.remaining_tx.send_replace(0);
        self.state_tx.send_replace(OrderUiState::Idle);
    }

    /// An external settlement was observed; moves Ready -> Paid when it
    /// matches the tracked order.
    pub fn observe_settlement(&self, notice: &SettlementNotice) {
        let OrderUiState::Ready(view) = self.state() else {
            return;
        };
        if view.order_id != notice.order_id {
            debug!(
                tracked = %view.order_id,
                settled = %notice.order_id,
                "settlement for a different order, ignoring"
            );
            return;
        }
        self.stop_countdown();
        self.remaining_tx.send_replace(0);
        self.state_tx.send_replace(OrderUiState::Paid);
        info!(order_id = %notice.order_id, "tracked order settled");
    }

    fn start_countdown(&self, expires_at: DateTime<Utc>) {
        self.stop_countdown();
        let state_tx = self.state_tx.clone();
        let remaining_tx = self.remaining_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                let remaining = (expires_at - Utc::now()).num_seconds();
                if remaining <= 0 {
                    remaining_tx.send_replace(0);
                    state_tx.send_replace(OrderUiState::Expired);
                    break;
                }
                remaining_tx.send_replace(remaining);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
        *self.countdown.lock().expect("countdown lock poisoned") = Some(handle);
    }

    fn stop_countdown(&self) {
        if let Some(handle) = self
            .countdown
            .lock()
            .expect("countdown lock poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for OrderSession {
    fn drop(&mut self) {
        self.stop_countdown();
    }
}

/// Wire the reactor's settlement notices into a session. The spawned task
/// ends when the reactor (and its broadcast channel) goes away.
pub fn attach_settlement_feed(
    session: Arc<OrderSession>,
    mut notices: broadcast::Receiver<SettlementNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => session.observe_settlement(&notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "settlement feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
