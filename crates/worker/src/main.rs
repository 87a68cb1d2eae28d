use std::time::Duration;

use anyhow::Context;
use guildhall_core::registry::EntityKindRegistry;
use tokio_util::sync::CancellationToken;

use guildhall_worker::config::WorkerConfig;
use guildhall_worker::{retention, telemetry, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    telemetry::init_tracing(config.log_format);
    tracing::info!(
        retention_days = config.retention_days,
        compaction_interval_secs = config.compaction_interval.as_secs(),
        strict_references = config.strict_references,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = guildhall_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!(max_connections = config.db_max_connections, "Database connection pool created");

    guildhall_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    guildhall_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Services ---
    let services = Services::postgres(pool.clone(), EntityKindRegistry::with_builtin_kinds(), &config);
    tracing::info!(
        registry_version = services.registry.version(),
        kinds = services.registry.kinds().count(),
        "Entity kind registry loaded"
    );

    // --- Compaction ---
    let cancel = CancellationToken::new();
    let compaction_handle = tokio::spawn(retention::run(
        services.notifications.clone(),
        services.analytics.clone(),
        config.retention(),
        config.compaction_interval,
        cancel.clone(),
    ));

    shutdown_signal().await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), compaction_handle).await;
    tracing::info!("Compaction job stopped");

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
