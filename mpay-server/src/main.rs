//! mpay server
//!
//! Keeps payment records in line with MercadoPago: receives processor
//! notifications, reconciles them against the authoritative payment state,
//! and serves the Service API for the host application.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use mpay_core::config::ConfigStore;
use mpay_core::events::notification_channel;
use mpay_core::framework::DatabaseProcessor;
use mpay_core::gateway::MercadoPagoClient;
use mpay_core::ingress::NotificationIngress;
use mpay_core::processors::NotificationWorker;
use mpay_core::reconcile::Reconciler;
use mpay_core::store::PgPaymentStore;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// mpay - MercadoPago payment reconciliation service
#[derive(Parser, Debug)]
#[command(name = "mpay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./mpay-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MPAY_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting mpay-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.listen;
    tracing::info!(
        sandbox = loaded_config.processor.sandbox,
        "Configuration loaded from {:?}",
        args.config
    );

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Wire the reconciliation engine
    let store = Arc::new(PgPaymentStore::new(DatabaseProcessor {
        pool: db_pool.clone(),
    }));
    let processor = Arc::new(MercadoPagoClient::new(&loaded_config.processor));
    let policy_store = ConfigStore::new(loaded_config.policy.clone());
    let reconciler = Reconciler::new(
        store,
        processor,
        policy_store.clone(),
        loaded_config.processor.sandbox,
    );

    // Notification queue and worker
    let (notification_tx, notification_rx) = notification_channel(loaded_config.queue_capacity);
    let ingress = NotificationIngress::new(notification_tx, &loaded_config.processor);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(
        NotificationWorker::new(reconciler.clone(), notification_rx, shutdown_rx).run(),
    );

    // Create application state
    let state = AppState::new(
        reconciler,
        ingress,
        ConfigStore::new(loaded_config.service),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify =
        spawn_config_reload_handler(state.clone(), config_loader, policy_store);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop the worker and the config reload handler
    tracing::info!("Stopping notification worker...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!("Notification worker task failed: {}", e);
    }
    shutdown_notify.notify_one();

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
