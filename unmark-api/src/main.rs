//! # unmark API Server
//!
//! Receives chat updates and provider completion notifications, and serves
//! the admin API.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p unmark-api
//! ```

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unmark_api::{
    app::{build_router, AppState},
    config::Config,
};
use unmark_shared::db::migrations::{get_migration_status, run_migrations};
use unmark_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use unmark_shared::messenger::TelegramMessenger;
use unmark_shared::payments::CryptoPayClient;
use unmark_shared::provider::{KieClient, KieConfig};
use unmark_shared::store::postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "unmark_api=debug,unmark_shared=debug,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("unmark API server v{} starting...", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    run_migrations(&pool).await?;
    let status = get_migration_status(&pool).await?;
    tracing::info!(
        applied = status.applied_migrations,
        latest = ?status.latest_version,
        "Database migrations applied"
    );

    let messenger = Arc::new(TelegramMessenger::new(&config.telegram.bot_token)?);
    let provider = Arc::new(KieClient::new(KieConfig {
        api_base: config.provider.api_base.clone(),
        model: config.provider.model.clone(),
        callback_url: config.provider.callback_url.clone(),
        timeout: config.provider.timeout,
    })?);
    let payments = Arc::new(CryptoPayClient::new(
        &config.payments.token,
        &config.payments.api_base,
    )?);

    let bind_address = config.bind_address();
    let state = AppState::new(
        Arc::new(PgStore::new(pool.clone())),
        messenger,
        provider,
        payments,
        config,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool...");
    close_pool(pool).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
