// All service modules
pub mod lobby_status;
pub mod prize_distribution;
pub mod settlement;
pub mod status_sync;

// Re-export for convenience
pub use settlement::SettlementService;
pub use status_sync::StatusSync;

use crate::{config::Config, db::Database};
use std::sync::Arc;

/// Start all background services
pub async fn start_background_services(db: Database, config: Config) {
    tracing::info!("Starting background services...");

    if config.enable_auto_settlement {
        tracing::info!("Auto settlement enabled");
    }

    let status_sync = Arc::new(StatusSync::new(db, config));
    status_sync.start().await;

    tracing::info!("All background services started successfully");
}
