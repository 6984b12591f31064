use std::sync::Arc;

use tracing::info;

use mercado_api::AppStateInner;
use mercado_gateway::Relay;
use mercado_gateway::bridge;
use mercado_gateway::registry::ConnectionRegistry;
use mercado_server::{ServerConfig, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercado=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(mercado_db::Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    // One registry shared by the relay and the HTTP-side bridge
    let registry = ConnectionRegistry::new();
    let bridge = bridge::global();
    bridge.configure(registry.clone());

    let relay = Relay::new(db.clone(), registry);
    let app_state = AppStateInner::new(db, config.jwt_secret.clone(), config.token_ttl, bridge.clone());

    let app = build_router(app_state, relay);

    let addr = config.addr()?;
    info!("Mercado relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
