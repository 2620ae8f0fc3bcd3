//! Ledger Core bootstrap
//!
//! Owns the process-wide resources the ledger borrows:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Logging  │───▶│   Pool   │───▶│  Schema  │
//! │  (YAML)  │    │(tracing) │    │  (sqlx)  │    │  (DDL)   │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! The pool stays open until ctrl-c, then drains and closes.

use std::time::Duration;

use anyhow::Context;
use ledger_core::config::AppConfig;
use ledger_core::db::{Database, schema};
use ledger_core::ledger::{PgStore, TransferExecutor};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = ledger_core::logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        "Starting ledger core in {} mode",
        env
    );

    let db = Database::connect(&app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    schema::init_schema(db.pool())
        .await
        .context("Failed to initialize schema")?;
    db.health_check().await.context("Health check failed")?;

    let store = PgStore::new(db.pool().clone()).with_isolation(app_config.database.isolation_level);
    let mut executor = TransferExecutor::new(store);
    if app_config.transfer.timeout_ms > 0 {
        executor = executor.with_timeout(Duration::from_millis(app_config.transfer.timeout_ms));
    }
    tracing::info!(
        isolation = ?app_config.database.isolation_level,
        timeout_ms = app_config.transfer.timeout_ms,
        "Transfer executor ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    drop(executor);
    db.close().await;
    Ok(())
}
