use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use curtain_booking::ExpirySweeper;
use curtain_core::{Clock, EventPublisher, SeatLedger};
use curtain_store::HoldingConfig;

/// Starts the background sweep of long-expired holdings.
pub fn start_expiry_sweeper(
    ledger: Arc<dyn SeatLedger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: &HoldingConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let retention = config.retention();
    let interval = std::time::Duration::from_secs(config.sweep_interval_seconds.max(1));
    let sweeper = ExpirySweeper::new(ledger, publisher, clock, retention);

    info!(
        interval_secs = interval.as_secs(),
        retention_secs = config.retention_seconds,
        "Expiry sweeper started"
    );
    tokio::spawn(sweeper.run(interval, shutdown))
}
