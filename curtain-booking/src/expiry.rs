use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use curtain_core::events::{self, publish_quietly};
use curtain_core::{Clock, EngineResult, EventPublisher, SeatLedger};
use curtain_shared::models::events::ReleaseReason;

/// Deletes holding records that expired more than `retention` ago.
///
/// Expiry itself never depends on this: reads already treat expired holdings
/// as absent. The sweep only reclaims storage.
pub struct ExpirySweeper {
    ledger: Arc<dyn SeatLedger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl ExpirySweeper {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        retention: Duration,
    ) -> Self {
        Self {
            ledger,
            publisher,
            clock,
            retention,
        }
    }

    pub async fn sweep_once(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        // Retention reaching past the earliest representable instant keeps everything.
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return Ok(0);
        };
        let purged = self.ledger.purge_expired(cutoff).await?;
        for holding in &purged {
            publish_quietly(
                self.publisher.as_ref(),
                events::holding_released(holding, ReleaseReason::Expired, now),
            )
            .await;
        }
        if !purged.is_empty() {
            info!(count = purged.len(), "expired holdings purged");
        }
        Ok(purged.len())
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Expiry sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("expiry sweeper stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::{HeldSeat, Holding, ManualClock, SlotKey, TracingPublisher};
    use curtain_store::MemoryLedger;

    #[tokio::test]
    async fn test_sweep_respects_retention() {
        let clock = Arc::new(ManualClock::default());
        let ledger = Arc::new(MemoryLedger::new());
        let slot = SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap();
        let holding = Holding::new(
            slot,
            "user-42",
            vec![HeldSeat { seat_id: "1층-A-1-1".parse().unwrap(), grade: "VIP".into(), price: 1 }],
            clock.now(),
            Duration::minutes(10),
        );
        ledger.claim_seats(&holding, clock.now()).await.unwrap();

        let sweeper = ExpirySweeper::new(ledger.clone(), Arc::new(TracingPublisher), clock.clone(), Duration::minutes(5));

        clock.advance(Duration::minutes(12));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

        clock.advance(Duration::minutes(4));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert!(ledger.get_holding(holding.holding_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unbounded_retention_keeps_records() {
        let clock = Arc::new(ManualClock::default());
        let ledger = Arc::new(MemoryLedger::new());
        let slot = SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap();
        let holding = Holding::new(
            slot,
            "user-42",
            vec![HeldSeat { seat_id: "1층-A-1-2".parse().unwrap(), grade: "VIP".into(), price: 1 }],
            clock.now(),
            Duration::minutes(10),
        );
        ledger.claim_seats(&holding, clock.now()).await.unwrap();

        let sweeper = ExpirySweeper::new(ledger.clone(), Arc::new(TracingPublisher), clock.clone(), Duration::MAX);
        clock.advance(Duration::days(30));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert!(ledger.get_holding(holding.holding_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sweeper = ExpirySweeper::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(TracingPublisher),
            Arc::new(ManualClock::default()),
            Duration::zero(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(std::time::Duration::from_millis(10), rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
