use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use domain::services::{
    Clock, DocumentStore, InMemoryDocumentStore, InMemoryRequestStore, LogNotifier, Notifier,
    RequestStore, SystemClock,
};
use persistence::repositories::PgRequestStore;
use sar_admin_api::app::{create_app, AppState};
use sar_admin_api::config::{Config, StorageBackend};
use sar_admin_api::jobs::{
    BacklogAlertJob, JobScheduler, OverdueAlertJob, PoolMetricsJob, RetentionCleanupJob,
    TimeoutSweepJob,
};
use sar_admin_api::middleware::{init_metrics, logging::init_logging};
use sar_admin_api::services::{HttpDocumentStore, WebhookNotifier};

/// How long in-flight job runs get to finish after the server stops.
const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::load()?);

    init_logging(&config.logging).context("Failed to initialise logging")?;
    init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting SAR admin API v{}", env!("CARGO_PKG_VERSION"));

    let (store, pool): (Arc<dyn RequestStore>, Option<PgPool>) = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config: persistence::db::DatabaseConfig = (&config.database).into();
            let pool = persistence::db::create_pool(&db_config).await?;

            info!("Running database migrations...");
            sqlx::migrate!("../persistence/src/migrations")
                .run(&pool)
                .await?;
            info!("Migrations completed");

            let store: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(pool.clone()));
            (store, Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; requests are lost on restart");
            let store: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::new());
            (store, None)
        }
    };

    let documents: Arc<dyn DocumentStore> = if config.document_store.base_url.is_empty() {
        warn!("No document store configured; reports are kept in memory");
        Arc::new(InMemoryDocumentStore::new())
    } else {
        Arc::new(HttpDocumentStore::new(&config.document_store)?)
    };

    let notifier: Arc<dyn Notifier> = if config.notifier.webhook_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new(&config.notifier)?)
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = if config.watchdog.enabled {
        let watchdog = &config.watchdog;
        let mut scheduler = JobScheduler::new(
            Arc::clone(&notifier),
            Arc::clone(&clock),
            Duration::from_secs(watchdog.initial_jitter_secs),
        );
        scheduler.register(OverdueAlertJob::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            watchdog.overdue_threshold(),
            watchdog.overdue_alert_interval_minutes,
        ));
        scheduler.register(TimeoutSweepJob::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            watchdog.timeout_threshold(),
            config.claim_settings().lock_timeout,
            watchdog.timeout_sweep_interval_minutes,
        ));
        scheduler.register(BacklogAlertJob::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            watchdog.backlog_threshold,
            watchdog.backlog_alert_interval_minutes,
        ));
        scheduler.register(RetentionCleanupJob::new(
            Arc::clone(&store),
            Arc::clone(&documents),
            Arc::clone(&clock),
            watchdog.retention_age(),
            watchdog.retention_cleanup_interval_minutes,
        ));
        if let Some(pool) = &pool {
            scheduler.register(PoolMetricsJob::new(
                pool.clone(),
                watchdog.pool_metrics_interval_secs,
            ));
        }

        info!(jobs = ?scheduler.job_names(), "Watchdog jobs registered");
        scheduler.start();
        Some(scheduler)
    } else {
        info!("Watchdog disabled");
        None
    };

    let state = AppState::new(Arc::clone(&config), store, documents, clock, pool);
    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
        scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
