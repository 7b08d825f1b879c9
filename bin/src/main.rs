//! `washflowd` — the laundromat fulfillment server.
//!
//! Usage:
//!   washflowd --data-dir /var/lib/washflow [--listen 0.0.0.0:8080]
//!             [--transfer-tracking]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use washflow_core::{Clock, Module, ServiceConfig, SystemClock};
use washflow_fulfillment::FulfillmentModule;
use washflow_fulfillment::audit::{AuditRecorder, Notifier, NoopNotifier, TracingRecorder};
use washflow_fulfillment::engine::WorkflowConfig;
use washflow_fulfillment::store::{FulfillmentStore, SqliteStore};

/// Washflow fulfillment server.
#[derive(Parser, Debug)]
#[command(name = "washflowd", about = "Laundromat order fulfillment server")]
struct Cli {
    /// Data directory for on-disk storage.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// SQLite database path (defaults to {data-dir}/data.sqlite).
    #[arg(long = "sqlite")]
    sqlite: Option<PathBuf>,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Track the wash→dry transfer as its own checked stage.
    #[arg(long = "transfer-tracking")]
    transfer_tracking: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = ServiceConfig {
        data_dir: cli.data_dir.clone(),
        sqlite_path: cli.sqlite.clone(),
        listen: cli.listen.clone(),
    };

    if let Some(dir) = &config.data_dir {
        std::fs::create_dir_all(dir)?;
    }

    let sqlite_path = config.resolve_sqlite_path();
    info!("Opening SQLite store at {}", sqlite_path.display());
    let store: Arc<dyn FulfillmentStore> = Arc::new(
        SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open store: {e}"))?,
    );

    let audit: Arc<dyn AuditRecorder> = Arc::new(TracingRecorder);
    let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let workflow = WorkflowConfig {
        transfer_tracking: cli.transfer_tracking,
        ..WorkflowConfig::default()
    };
    let module = FulfillmentModule::new(store, audit, notifier, clock, workflow);
    info!("Fulfillment module initialized");

    let app = axum::Router::new().nest(&format!("/{}", module.name()), module.routes());

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Washflow server listening on {}", config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
