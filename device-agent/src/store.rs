//! Local, device-side mirror of settled payments. Keyed by settlement id so
//! redelivered pushes collapse onto a single record.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub settlement_id: String,
    pub amount: i64,
    pub order_id: Option<String>,
    pub payer_name: Option<String>,
    pub received_at: DateTime<Utc>,
    pub synced: bool,
}

#[async_trait::async_trait]
pub trait SettlementStore: Send + Sync {
    /// Insert unless a record with this settlement id already exists.
    /// Returns true when the record was newly created.
    async fn insert_if_absent(&self, record: SettlementRecord) -> bool;
    async fn get(&self, settlement_id: &str) -> Option<SettlementRecord>;
    /// Mark the locally tracked order view as settled.
    async fn mark_order_paid(&self, order_id: &str, settlement_id: &str);
    async fn unsynced(&self) -> Vec<SettlementRecord>;
    async fn mark_synced(&self, settlement_id: &str);
}

/// In-memory store backing tests and embedders that bring their own
/// persistence behind the same trait.
#[derive(Default)]
pub struct MemoryStore {
    settlements: Mutex<HashMap<String, SettlementRecord>>,
    paid_orders: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paid_order(&self, order_id: &str) -> Option<String> {
        self.paid_orders
            .lock()
            .expect("memory store poisoned")
            .get(order_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl SettlementStore for MemoryStore {
    async fn insert_if_absent(&self, record: SettlementRecord) -> bool {
        let mut settlements = self.settlements.lock().expect("memory store poisoned");
        if settlements.contains_key(&record.settlement_id) {
            return false;
        }
        settlements.insert(record.settlement_id.clone(), record);
        true
    }

    async fn get(&self, settlement_id: &str) -> Option<SettlementRecord> {
        self.settlements
            .lock()
            .expect("memory store poisoned")
            .get(settlement_id)
            .cloned()
    }

    async fn mark_order_paid(&self, order_id: &str, settlement_id: &str) {
        self.paid_orders
            .lock()
            .expect("memory store poisoned")
            .insert(order_id.to_string(), settlement_id.to_string());
    }

    async fn unsynced(&self) -> Vec<SettlementRecord> {
        self.settlements
            .lock()
            .expect("memory store poisoned")
            .values()
            .filter(|r| !r.synced)
            .cloned()
            .collect()
    }

    async fn mark_synced(&self, settlement_id: &str) {
        if let Some(record) = self
            .settlements
            .lock()
            .expect("memory store poisoned")
            .get_mut(settlement_id)
        {
            record.synced = true;
        }
    }
}
