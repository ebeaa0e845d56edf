//! Dripfeed publishing service.
//!
//! Main entry point for the scheduler daemon. Initializes storage, the
//! publish client, and the interval scheduler, then runs until a shutdown
//! signal arrives.

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dripfeed_core::{storage::Storage, RealClock, TracingEventHandler};
use dripfeed_delivery::{
    ClientConfig, CycleConfig, DispatchCycle, PublishClient, RetryPolicy, Scheduler,
    SqliteDispatchStorage,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("Starting dripfeed publishing service");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        database_path = %config.database_path,
        cycle_interval_secs = config.cycle_interval.as_secs(),
        pacing_delay_secs = config.pacing_delay.as_secs(),
        "Configuration loaded"
    );

    // Create database connection pool
    let db_pool = create_database_pool(&config).await?;
    info!("Database connection established");

    // Run database migrations
    dripfeed_core::storage::run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    storage.health_check().await.context("Database health check failed")?;

    // Log the current page distribution so a restart is observable
    let counts = storage.pages.status_counts().await.context("Failed to read page counts")?;
    for (status, count) in counts {
        info!(status = %status, count, "page status distribution");
    }

    let clock = Arc::new(RealClock);
    let client = Arc::new(
        PublishClient::new(ClientConfig {
            timeout: config.request_timeout,
            ..ClientConfig::default()
        })
        .context("Failed to build publish client")?,
    );

    let cycle = Arc::new(DispatchCycle::new(
        Arc::new(SqliteDispatchStorage::new(storage)),
        client,
        CycleConfig { pacing_delay: config.pacing_delay, retry_policy: RetryPolicy::default() },
        clock.clone(),
        Arc::new(TracingEventHandler),
    ));

    let cancel = CancellationToken::new();
    let scheduler =
        Arc::new(Scheduler::new(cycle, config.cycle_interval, clock, cancel.clone()));

    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    info!("Dripfeed is running");

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    // Let an in-flight cycle finish before tearing the pool down
    cancel.cancel();
    scheduler_handle.await.context("Scheduler task panicked")?;

    db_pool.close().await;
    info!("Database connections closed");

    info!("Dripfeed shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,dripfeed=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the SQLite connection pool, creating the database file if needed.
async fn create_database_pool(config: &Config) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_path)
        .context("Invalid DATABASE_URL format")?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    // Verify the connection works before going further
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("Failed to verify database connection")?;

    Ok(pool)
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Service configuration.
struct Config {
    /// SQLite database location, as a sqlite: URL or plain path
    database_path: String,
    /// Maximum database connections
    database_max_connections: u32,
    /// Interval between dispatch cycles
    cycle_interval: Duration,
    /// Pause after each successful publish
    pacing_delay: Duration,
    /// Timeout for each publish request
    request_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    fn from_env() -> Result<Self> {
        let database_path =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://dripfeed.db".to_string());

        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let cycle_interval = duration_from_env(
            "CYCLE_INTERVAL_SECONDS",
            dripfeed_delivery::DEFAULT_CYCLE_INTERVAL_SECONDS,
        )?;
        let pacing_delay = duration_from_env(
            "PACING_DELAY_SECONDS",
            dripfeed_delivery::DEFAULT_PACING_DELAY_SECONDS,
        )?;
        let request_timeout = duration_from_env(
            "REQUEST_TIMEOUT_SECONDS",
            dripfeed_delivery::DEFAULT_TIMEOUT_SECONDS,
        )?;

        Ok(Self {
            database_path,
            database_max_connections,
            cycle_interval,
            pacing_delay,
            request_timeout,
        })
    }
}

/// Reads a duration in whole seconds from the environment.
fn duration_from_env(name: &str, default_secs: u64) -> Result<Duration> {
    match std::env::var(name) {
        Ok(value) => {
            let secs: u64 =
                value.parse().with_context(|| format!("{name} must be a whole number"))?;
            Ok(Duration::from_secs(secs))
        },
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
