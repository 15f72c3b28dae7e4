use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected charge: {0}")]
    Rejected(String),
}

/// QR charge issued by the payment gateway for a pending order. The local
/// validity window governs expiry, so only the QR payload is carried over.
#[derive(Debug, Clone)]
pub struct QrisCharge {
    pub qr_payload: String,
}

/// Adapter over the external payment gateway. The service only ever asks it
/// to issue a QR charge or cancel one; settlement arrives asynchronously via
/// the webhook.
#[async_trait::async_trait]
pub trait QrisGateway: Send + Sync {
    async fn charge(&self, order_id: &str, amount: i64) -> Result<QrisCharge, GatewayError>;
    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError>;
}

#[derive(Deserialize)]
struct ChargeResponse {
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    qr_string: Option<String>,
    #[serde(default)]
    actions: Vec<ChargeAction>,
}

#[derive(Deserialize)]
struct ChargeAction {
    name: String,
    url: String,
}

/// HTTP implementation against a Midtrans-style core API.
pub struct HttpQrisGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl HttpQrisGateway {
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            server_key: server_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl QrisGateway for HttpQrisGateway {
    async fn charge(&self, order_id: &str, amount: i64) -> Result<QrisCharge, GatewayError> {
        let body = json!({
            "payment_type": "qris",
            "transaction_details": { "order_id": order_id, "gross_amount": amount },
            "qris": { "acquirer": "gopay" },
        });
        let resp = self
            .client
            .post(format!("{}/v2/charge", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let charge: ChargeResponse = resp
            .json()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if charge.status_code != "200" && charge.status_code != "201" {
            return Err(GatewayError::Rejected(
                charge
                    .status_message
                    .unwrap_or_else(|| format!("status {}", charge.status_code)),
            ));
        }

        // The QR payload is either inline or behind a generate-qr-code action.
        let qr_payload = charge
            .qr_string
            .or_else(|| {
                charge
                    .actions
                    .into_iter()
                    .find(|a| a.name == "generate-qr-code")
                    .map(|a| a.url)
            })
            .ok_or_else(|| GatewayError::Rejected("charge carried no QR payload".into()))?;

        info!(order_id, "gateway charge created");
        Ok(QrisCharge { qr_payload })
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        let resp = self
            .client
            .post(format!("{}/v2/{}/cancel", self.base_url, order_id))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        if !resp.status().is_success() {
            warn!(order_id, status = %resp.status(), "gateway cancel returned failure status");
        }
        Ok(())
    }
}

/// Deterministic gateway for tests: issues a synthetic QR payload, optionally
/// scripted to fail.
pub struct StubGateway {
    pub fail_charge: bool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self { fail_charge: false }
    }

    pub fn failing() -> Self {
        Self { fail_charge: true }
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QrisGateway for StubGateway {
    async fn charge(&self, order_id: &str, amount: i64) -> Result<QrisCharge, GatewayError> {
        if self.fail_charge {
            return Err(GatewayError::Rejected("stub gateway declined".into()));
        }
        Ok(QrisCharge {
            qr_payload: format!("00020101-STUB-{order_id}-{amount}"),
        })
    }

    async fn cancel(&self, _order_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_gateway_scripts_failure() {
        let ok = StubGateway::new().charge("ORDER-1", 15000).await;
        assert!(ok.is_ok());
        let err = StubGateway::failing().charge("ORDER-1", 15000).await;
        assert!(matches!(err, Err(GatewayError::Rejected(_))));
    }
}
