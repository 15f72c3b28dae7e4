//! Device-side end-to-end: a pushed settlement lands in the store, the
//! announcer completes its sequence, and the tracked order flips to Paid.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common_wire::PaymentPush;
use device_agent::announcer::{Announcer, AnnouncerDeps, Stage};
use device_agent::audio::stub::{StubAlert, StubAudio, StubNotifier, StubSpeech, StubTone, StubWake};
use device_agent::audio::AudioOutput;
use device_agent::session::{OrderApi, OrderApiError, OrderView};
use device_agent::{
    attach_settlement_feed, MemoryStore, OrderSession, OrderUiState, SettlementReactor,
    SettlementStore,
};

struct OneOrderApi;

#[async_trait::async_trait]
impl OrderApi for OneOrderApi {
    async fn create_order(&self, amount: i64) -> Result<OrderView, OrderApiError> {
        Ok(OrderView {
            order_id: "ORDER-E2E".into(),
            qr_payload: "00020101-E2E".into(),
            amount,
            expires_at: Utc::now() + chrono::Duration::minutes(5),
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), OrderApiError> {
        Ok(())
    }
}

#[tokio::test]
async fn pushed_settlement_flows_through_store_announcer_and_session() {
    let store = Arc::new(MemoryStore::new());
    let speech = Arc::new(StubSpeech::new());
    let audio = Arc::new(StubAudio::new(4, 15));
    let announcer = Announcer::spawn_with_grace(
        AnnouncerDeps {
            output: audio.clone(),
            tone: Arc::new(StubTone::new()),
            speech: speech.clone(),
            alert: Arc::new(StubAlert::default()),
        },
        Duration::from_millis(1),
    );
    let reactor = SettlementReactor::new(
        store.clone(),
        announcer.clone(),
        Arc::new(StubNotifier::default()),
        Arc::new(StubWake::default()),
    );

    let session = OrderSession::new(Arc::new(OneOrderApi), 1_000);
    let feed = attach_settlement_feed(session.clone(), reactor.subscribe());

    session.generate(15_000).await;
    assert!(matches!(session.state(), OrderUiState::Ready(_)));

    let push = PaymentPush::settled("TX-E2E", Some("ORDER-E2E".into()), 15_000, Some("Budi".into()));
    reactor.on_settlement_pushed(push).await;

    assert_eq!(announcer.settled().await, Stage::Done);
    let mut state = session.watch_state();
    tokio::time::timeout(Duration::from_secs(1), async {
        while *state.borrow_and_update() != OrderUiState::Paid {
            state.changed().await.expect("session state channel open");
        }
    })
    .await
    .expect("session reached Paid");

    let record = store.get("TX-E2E").await.expect("one settlement record");
    assert_eq!(record.order_id.as_deref(), Some("ORDER-E2E"));
    assert_eq!(record.payer_name.as_deref(), Some("Budi"));
    assert_eq!(store.unsynced().await.len(), 1);
    assert_eq!(audio.volume(), 4, "volume restored after the sequence");
    assert_eq!(
        speech.spoken.lock().unwrap().as_slice(),
        ["Pembayaran lima belas ribu rupiah, berhasil diterima"]
    );

    feed.abort();
}
