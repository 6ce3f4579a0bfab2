//! `drysyncd` — the DrySync engine daemon.
//!
//! Opens the embedded ledger, starts one state machine per rack slot off
//! the sensor feed, and logs operator prompts and stock changes. The UI
//! layer drives the same [`drysync_inventory::InventoryService`] commands.
//!
//! Usage:
//!   drysyncd -c /etc/drysync/drysync.toml

mod config;

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use drysync_inventory::slot::{self, PromptFn};
use drysync_inventory::{InventoryService, query};
use drysync_store::{LedgerStore, RedbStore};

use config::ServerConfig;

/// DrySync engine daemon.
#[derive(Parser, Debug)]
#[command(name = "drysyncd", about = "DrySync inventory engine daemon")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config.display());
    let server_config = ServerConfig::load(&cli.config)?;
    server_config.verify()?;

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = drysync_core::ServiceConfig {
        data_dir: Some(data_dir),
        slot_count: server_config.rack.slot_count,
        utc_offset_hours: server_config.rack.utc_offset_hours,
        low_stock_threshold: server_config.rack.low_stock_threshold,
        ..Default::default()
    };

    let store: Arc<dyn LedgerStore> = Arc::new(
        RedbStore::open(&core_config.resolve_db_path())
            .map_err(|e| anyhow::anyhow!("failed to open ledger store: {}", e))?,
    );
    info!("Ledger store opened at {}", core_config.resolve_db_path().display());

    let service = Arc::new(InventoryService::new(
        Arc::clone(&store),
        core_config.utc_offset_hours,
    ));

    // Operator prompts surface in the log; the UI layer subscribes to the
    // same state and renders the dialogs.
    let prompt: PromptFn = Arc::new(|p| {
        info!(slot = p.slot_id, kind = ?p.kind, "operator input needed");
    });
    let supervisor = slot::start(
        Arc::clone(&store),
        service.reconciler(),
        prompt,
        core_config.slot_count,
    );
    info!("Rack supervisor started ({} slots)", core_config.slot_count);

    // Log stock levels whenever the batch ledger changes.
    let mut watch = service.watch_batches();
    let threshold = core_config.low_stock_threshold;
    let stock_logger = tokio::spawn(async move {
        while let Some(batches) = watch.recv().await {
            info!(
                batches = batches.len(),
                available = query::available_count(&batches),
                low_stock = query::low_stock_count(&batches, threshold),
                "stock snapshot"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    supervisor.cancel();
    stock_logger.abort();
    Ok(())
}
