use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;

use settlement_service::gateway::HttpQrisGateway;
use settlement_service::push::{HttpPushSender, NoopPushSender, PushSender};
use settlement_service::sweeper::{spawn_expiry_sweeper, spawn_retention_sweeper};
use settlement_service::{build_router, repo, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(ServiceConfig::from_env()?);

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = PgPool::connect(&database_url).await?;
    repo::ensure_schema(&db).await?;

    let gateway = Arc::new(HttpQrisGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_server_key.clone(),
    ));
    let push: Arc<dyn PushSender> = match &config.push_endpoint {
        Some(endpoint) => Arc::new(HttpPushSender::new(endpoint.clone(), config.push_ttl_secs)),
        None => Arc::new(NoopPushSender),
    };

    spawn_expiry_sweeper(db.clone(), Duration::from_secs(config.expiry_sweep_secs));
    spawn_retention_sweeper(db.clone(), config.retention_days);

    let state = AppState {
        db: Some(db),
        config,
        gateway,
        push,
    };
    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting settlement-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
