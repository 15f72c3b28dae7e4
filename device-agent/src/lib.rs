//! Merchant-device side of the settlement pipeline: receives pushed
//! settlement events, persists them idempotently, announces the amount over
//! the device speaker, and tracks the on-screen order lifecycle.

pub mod announcer;
pub mod audio;
pub mod reactor;
pub mod session;
pub mod speech;
pub mod store;

pub use announcer::{Announcer, AnnouncerDeps, AnnouncerHandle, Stage};
pub use reactor::{SettlementNotice, SettlementReactor};
pub use session::{attach_settlement_feed, OrderApi, OrderSession, OrderUiState, OrderView};
pub use store::{MemoryStore, SettlementRecord, SettlementStore};
