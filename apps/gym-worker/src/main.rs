//! # Gym Worker
//!
//! Background process for the gym back office.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Gym Worker                                     │
//! │                                                                         │
//! │  sweep tick     ───► MembershipManager::sweep_expirations(today)        │
//! │  reconcile tick ───► Reconciler::reconcile_stale_sales(stale_after)     │
//! │  SIGINT/SIGTERM ───► stop after the running tick                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;

use anyhow::Context;
use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gym_db::Database;
use gym_engine::{Engine, EngineError};

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting gym worker...");

    let config = WorkerConfig::load().context("loading worker configuration")?;
    info!(
        db = %config.database_path.display(),
        sweep_secs = config.sweep_interval_secs,
        reconcile_secs = config.reconcile_interval_secs,
        stale_secs = config.stale_after_secs,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("opening database")?;
    info!("Database ready");

    let engine = Engine::sqlite(&db, config.engine_config());
    let stale_after = chrono::Duration::from_std(config.stale_after())
        .context("GYM_STALE_AFTER_SECS out of range")?;

    let mut sweep = interval(config.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reconcile = interval(config.reconcile_interval());
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweep.tick() => run_sweep(&engine).await,
            _ = reconcile.tick() => run_reconcile(&engine, stale_after).await,
        }
    }

    db.close().await;
    info!("Worker shutdown complete");
    Ok(())
}

async fn run_sweep(engine: &Engine) {
    let today = Utc::now().date_naive();
    match engine.memberships.sweep_expirations(today).await {
        Ok(report) => {
            if report.transitioned > 0 {
                info!(%today, transitioned = report.transitioned, "Memberships expired");
            }
        }
        Err(EngineError::PartialFailure { succeeded, failed }) => {
            warn!(%today, succeeded, ?failed, "Expiry sweep left memberships behind");
        }
        Err(err) => error!(error = %err, "Expiry sweep failed"),
    }
}

async fn run_reconcile(engine: &Engine, stale_after: chrono::Duration) {
    match engine.reconciler.reconcile_stale_sales(stale_after).await {
        Ok(report) if !report.is_clean() => {
            warn!(failures = ?report.failures, "Some sales could not be reconciled");
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "Reconciliation pass failed"),
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=gym_engine=trace` - Show trace for the engine only
/// - Default: INFO, DEBUG for gym crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gym_engine=debug,gym_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
