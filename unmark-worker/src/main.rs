//! # unmark Worker
//!
//! Retries results whose delivery failed, expires pending jobs whose
//! completion notification never arrived and watches open invoices for payment.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p unmark-worker
//! ```

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unmark_shared::db::migrations::get_migration_status;
use unmark_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use unmark_shared::messenger::{Messenger, OperatorAlerts, TelegramMessenger};
use unmark_shared::payments::CryptoPayClient;
use unmark_shared::store::postgres::PgStore;
use unmark_worker::config::WorkerConfig;
use unmark_worker::orchestrator::WorkerOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "unmark_worker=debug,unmark_shared=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("unmark Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        ..Default::default()
    })
    .await?;

    // Migrations are applied by the API server.
    let status = get_migration_status(&pool).await?;
    if status.applied_migrations == 0 {
        anyhow::bail!("Database schema is missing; start the API server first");
    }

    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(&config.bot_token)?);
    let mut orchestrator = WorkerOrchestrator::new(
        Arc::new(PgStore::new(pool.clone())),
        messenger.clone(),
        Arc::new(CryptoPayClient::new(&config.crypto_token, &config.crypto_api_base)?),
        config.orchestrator.clone(),
    );
    match config.admin_chat_id {
        Some(chat_id) => {
            orchestrator = orchestrator.with_alerts(OperatorAlerts::new(messenger, chat_id));
        }
        None => tracing::warn!("ADMIN_CHAT_ID not set; undelivered results are only logged"),
    }

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    orchestrator.run().await?;
    close_pool(pool).await;

    Ok(())
}
