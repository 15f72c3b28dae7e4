//! Wire types shared between the settlement service and the device agent:
//! the order API surface, the gateway settlement callback, and the push
//! message schema consumed on the merchant device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order lifecycle status. Transitions only move forward; `Paid`, `Expired`
/// and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Expired => "expired",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "expired" => Some(OrderStatus::Expired),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub merchant_id: String,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub qr_payload: String,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub merchant_id: String,
    pub push_token: String,
}

/// Gateway-side transaction status carried on the settlement callback.
pub mod gateway_status {
    pub const SETTLEMENT: &str = "settlement";
    pub const CAPTURE: &str = "capture";
    pub const PENDING: &str = "pending";
    pub const DENY: &str = "deny";
    pub const CANCEL: &str = "cancel";
    pub const EXPIRE: &str = "expire";
    pub const FAILURE: &str = "failure";
}

/// Asynchronous settlement callback emitted by the payment gateway.
///
/// The signature covers `order_id`, `status_code` and `gross_amount`; every
/// inbound callback is recorded for audit before any verification outcome is
/// acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCallback {
    pub order_id: String,
    pub settlement_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    pub signature: String,
    #[serde(default)]
    pub payer_name: Option<String>,
}

impl SettlementCallback {
    /// A callback settles the order iff the gateway reports `settlement`, or
    /// `capture` with fraud screening passed.
    pub fn is_successful(&self) -> bool {
        self.transaction_status == gateway_status::SETTLEMENT
            || (self.transaction_status == gateway_status::CAPTURE
                && self.fraud_status.as_deref() == Some("accept"))
    }
}

pub const PUSH_KIND_PAYMENT: &str = "payment";
pub const PUSH_STATUS_SUCCESS: &str = "success";

/// Push message dispatched to the merchant device after a settlement commits.
/// Delivered with high priority and a short time-to-live; a stale payment
/// alert is worse than a dropped one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPush {
    #[serde(rename = "type")]
    pub kind: String,
    pub settlement_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub payer_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PaymentPush {
    pub fn settled(
        settlement_id: impl Into<String>,
        order_id: Option<String>,
        amount: i64,
        payer_name: Option<String>,
    ) -> Self {
        Self {
            kind: PUSH_KIND_PAYMENT.to_string(),
            settlement_id: settlement_id.into(),
            order_id,
            amount,
            status: PUSH_STATUS_SUCCESS.to_string(),
            payer_name,
            timestamp: Utc::now(),
        }
    }

    /// Gate for device-side processing: only successful payment pushes are
    /// acted on, anything else is ignored.
    pub fn is_settled(&self) -> bool {
        self.kind == PUSH_KIND_PAYMENT && self.status == PUSH_STATUS_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Expired,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("settled"), None);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn capture_requires_fraud_accept() {
        let mut cb = SettlementCallback {
            order_id: "ORDER-1".into(),
            settlement_id: "TX-1".into(),
            status_code: "200".into(),
            gross_amount: "15000".into(),
            transaction_status: gateway_status::CAPTURE.into(),
            fraud_status: Some("challenge".into()),
            signature: String::new(),
            payer_name: None,
        };
        assert!(!cb.is_successful());
        cb.fraud_status = Some("accept".into());
        assert!(cb.is_successful());
        cb.transaction_status = gateway_status::SETTLEMENT.into();
        cb.fraud_status = None;
        assert!(cb.is_successful());
    }

    #[test]
    fn push_serializes_kind_as_type() {
        let push = PaymentPush::settled("TX-9", Some("ORDER-9".into()), 15000, None);
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["type"], "payment");
        assert_eq!(json["status"], "success");
        assert!(push.is_settled());
    }
}
