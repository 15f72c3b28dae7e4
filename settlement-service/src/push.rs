use common_wire::PaymentPush;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport failed: {0}")]
    Transport(String),
    #[error("push endpoint returned status {0}")]
    Status(u16),
    #[error("push transport not configured")]
    NotConfigured,
}

/// Delivery to the merchant device's registered push address. Best-effort:
/// failures are logged and counted by the caller, never rolled back into the
/// settlement transaction.
#[async_trait::async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, push_token: &str, push: &PaymentPush) -> Result<(), PushError>;
}

/// FCM-style HTTP sender. High delivery priority and a short time-to-live:
/// a stale payment alert is worse than a dropped one.
pub struct HttpPushSender {
    client: reqwest::Client,
    endpoint: String,
    ttl_secs: u64,
}

impl HttpPushSender {
    pub fn new(endpoint: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, push_token: &str, push: &PaymentPush) -> Result<(), PushError> {
        let body = json!({
            "message": {
                "token": push_token,
                "data": push,
                "android": {
                    "priority": "high",
                    "ttl": format!("{}s", self.ttl_secs),
                },
            }
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| PushError::Transport(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(PushError::Status(resp.status().as_u16()));
        }
        info!(settlement_id = %push.settlement_id, "push dispatched");
        Ok(())
    }
}

/// Used when no push endpoint is configured; every dispatch is a logged skip.
pub struct NoopPushSender;

#[async_trait::async_trait]
impl PushSender for NoopPushSender {
    async fn send(&self, _push_token: &str, push: &PaymentPush) -> Result<(), PushError> {
        warn!(settlement_id = %push.settlement_id, "push endpoint not configured, dropping dispatch");
        Err(PushError::NotConfigured)
    }
}

/// Test double capturing every dispatched message.
#[derive(Default)]
pub struct RecordingPushSender {
    pub sent: std::sync::Mutex<Vec<(String, PaymentPush)>>,
}

#[async_trait::async_trait]
impl PushSender for RecordingPushSender {
    async fn send(&self, push_token: &str, push: &PaymentPush) -> Result<(), PushError> {
        self.sent
            .lock()
            .expect("recording sender poisoned")
            .push((push_token.to_string(), push.clone()));
        Ok(())
    }
}
