pub mod api_error;
pub mod app;
pub mod config;
pub mod gateway;
pub mod order_handlers;
pub mod push;
pub mod repo;
pub mod sweeper;
pub mod webhook;

pub use app::{build_router, AppState};
pub use config::ServiceConfig;
