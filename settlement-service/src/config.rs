use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub min_amount: i64,
    pub max_amount: i64,
    pub order_validity_secs: i64,
    pub gateway_base_url: String,
    pub gateway_server_key: String,
    pub push_endpoint: Option<String>,
    pub push_ttl_secs: u64,
    pub expiry_sweep_secs: u64,
    pub retention_days: i64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let gateway_server_key =
            env::var("GATEWAY_SERVER_KEY").context("GATEWAY_SERVER_KEY must be set")?;
        let gateway_base_url = env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.sandbox.midtrans.com".to_string());
        let min_amount = env::var("ORDER_MIN_AMOUNT")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(1_000);
        let max_amount = env::var("ORDER_MAX_AMOUNT")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(10_000_000);
        let order_validity_secs = env::var("ORDER_VALIDITY_SECONDS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(300);
        let push_endpoint = env::var("PUSH_ENDPOINT").ok();
        let push_ttl_secs = env::var("PUSH_TTL_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60);
        let expiry_sweep_secs = env::var("EXPIRY_SWEEP_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(30);
        let retention_days = env::var("ORDER_RETENTION_DAYS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(90);

        Ok(Self {
            min_amount,
            max_amount: max_amount.max(min_amount),
            order_validity_secs: order_validity_secs.max(60),
            gateway_base_url,
            gateway_server_key,
            push_endpoint,
            push_ttl_secs: push_ttl_secs.max(10),
            expiry_sweep_secs: expiry_sweep_secs.max(5),
            retention_days: retention_days.max(1),
        })
    }

    /// Configuration for tests: permissive defaults, no external endpoints.
    pub fn for_tests(server_key: &str) -> Self {
        Self {
            min_amount: 1_000,
            max_amount: 10_000_000,
            order_validity_secs: 300,
            gateway_base_url: String::new(),
            gateway_server_key: server_key.to_string(),
            push_endpoint: None,
            push_ttl_secs: 60,
            expiry_sweep_secs: 30,
            retention_days: 90,
        }
    }
}
