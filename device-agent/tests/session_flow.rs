use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use device_agent::session::{OrderApi, OrderApiError, OrderView};
use device_agent::{OrderSession, OrderUiState, SettlementNotice};

struct FakeApi {
    fail_create: AtomicBool,
    validity: Duration,
    cancelled: Mutex<Vec<String>>,
}

impl FakeApi {
    fn new(validity: Duration) -> Self {
        Self {
            fail_create: AtomicBool::new(false),
            validity,
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl OrderApi for FakeApi {
    async fn create_order(&self, amount: i64) -> Result<OrderView, OrderApiError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OrderApiError::new("Gagal generate QR Code"));
        }
        Ok(OrderView {
            order_id: format!("ORDER-{amount}"),
            qr_payload: "00020101-TEST".into(),
            amount,
            expires_at: Utc::now() + chrono::Duration::from_std(self.validity).unwrap(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), OrderApiError> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn generate_moves_to_ready_and_counts_down() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    let session = OrderSession::new(api, 1_000);

    session.generate(15_000).await;
    let OrderUiState::Ready(view) = session.state() else {
        panic!("expected Ready, got {:?}", session.state());
    };
    assert_eq!(view.order_id, "ORDER-15000");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let remaining = session.remaining_seconds();
    assert!(remaining > 100 && remaining <= 120, "remaining {remaining}");
}

#[tokio::test]
async fn expired_order_reaches_expired_with_zero_remaining() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(2)));
    let session = OrderSession::new(api, 1_000);

    session.generate(5_000).await;
    assert!(matches!(session.state(), OrderUiState::Ready(_)));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.state(), OrderUiState::Expired);
    assert_eq!(session.remaining_seconds(), 0);
}

#[tokio::test]
async fn amount_below_minimum_errors_without_api_call() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    let session = OrderSession::new(api, 1_000);

    session.generate(500).await;
    let OrderUiState::Error(message) = session.state() else {
        panic!("expected Error, got {:?}", session.state());
    };
    assert!(message.contains("1.000"), "message was: {message}");
}

#[tokio::test]
async fn create_failure_surfaces_the_message() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    api.fail_create.store(true, Ordering::SeqCst);
    let session = OrderSession::new(api, 1_000);

    session.generate(5_000).await;
    assert_eq!(
        session.state(),
        OrderUiState::Error("Gagal generate QR Code".into())
    );
}

#[tokio::test]
async fn cancel_requests_server_side_cancellation_and_resets() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    let session = OrderSession::new(api.clone(), 1_000);

    session.generate(5_000).await;
    session.cancel().await;

    assert_eq!(session.state(), OrderUiState::Idle);
    assert_eq!(session.remaining_seconds(), 0);
    assert_eq!(*api.cancelled.lock().unwrap(), vec!["ORDER-5000".to_string()]);

    // countdown is gone: state stays Idle well past the old expiry logic tick
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(session.state(), OrderUiState::Idle);
}

#[tokio::test]
async fn matching_settlement_moves_ready_to_paid() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    let session = OrderSession::new(api, 1_000);

    session.generate(15_000).await;
    session.observe_settlement(&SettlementNotice {
        order_id: "ORDER-99999".into(),
        settlement_id: "TX-OTHER".into(),
        amount: 99_999,
    });
    assert!(
        matches!(session.state(), OrderUiState::Ready(_)),
        "foreign settlement must not transition"
    );

    session.observe_settlement(&SettlementNotice {
        order_id: "ORDER-15000".into(),
        settlement_id: "TX-1".into(),
        amount: 15_000,
    });
    assert_eq!(session.state(), OrderUiState::Paid);
    assert_eq!(session.remaining_seconds(), 0);
}

#[tokio::test]
async fn reset_returns_to_idle_from_any_state() {
    let api = Arc::new(FakeApi::new(Duration::from_secs(120)));
    let session = OrderSession::new(api, 1_000);

    session.generate(5_000).await;
    session.reset();
    assert_eq!(session.state(), OrderUiState::Idle);

    session.generate(500).await;
    session.reset();
    assert_eq!(session.state(), OrderUiState::Idle);
}
