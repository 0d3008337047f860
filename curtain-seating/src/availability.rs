use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use curtain_catalog::{CatalogRepository, Performance, VenueLayout};
use curtain_core::{
    Clock, EngineError, EngineResult, Holding, Reservation, ResourceKind, SeatLedger, SeatStatus,
    SlotKey, StorageSeatId,
};

/// Status of every seat of one slot.
pub type SeatStatusMap = BTreeMap<StorageSeatId, SeatStatus>;

/// Merges reservations and holdings over the seat universe.
///
/// Active reservations mark `reserved`; unexpired holdings mark `holding`
/// unless the seat is already reserved; everything else is `available`.
pub fn project(
    universe: impl IntoIterator<Item = StorageSeatId>,
    reservations: &[Reservation],
    holdings: &[Holding],
    now: DateTime<Utc>,
) -> SeatStatusMap {
    let mut map: SeatStatusMap = universe
        .into_iter()
        .map(|seat| (seat, SeatStatus::Available))
        .collect();

    for reservation in reservations.iter().filter(|r| r.is_active()) {
        for seat in &reservation.seats {
            map.insert(seat.seat_id.clone(), SeatStatus::Reserved);
        }
    }

    for holding in holdings.iter().filter(|h| !h.is_expired_at(now)) {
        for seat_id in holding.seat_ids() {
            map.entry(seat_id.clone())
                .and_modify(|status| {
                    if *status != SeatStatus::Reserved {
                        *status = SeatStatus::Holding;
                    }
                })
                .or_insert(SeatStatus::Holding);
        }
    }

    map
}

#[derive(Clone)]
pub struct AvailabilityProjector {
    catalog: Arc<dyn CatalogRepository>,
    ledger: Arc<dyn SeatLedger>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityProjector {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        ledger: Arc<dyn SeatLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { catalog, ledger, clock }
    }

    pub async fn get_status_map(&self, slot: &SlotKey) -> EngineResult<SeatStatusMap> {
        let performance = self
            .catalog
            .get_performance(&slot.performance_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::Performance, &slot.performance_id))?;
        self.status_map_for(&performance, slot).await
    }

    pub async fn status_map_for(&self, performance: &Performance, slot: &SlotKey) -> EngineResult<SeatStatusMap> {
        let layout = VenueLayout::new(&performance.sections);
        let reservations = self.ledger.reservations_for_slot(slot).await?;
        let holdings = self.ledger.holdings_for_slot(slot).await?;
        Ok(project(
            layout.seat_universe(),
            &reservations,
            &holdings,
            self.clock.now(),
        ))
    }

    /// Claimed seats of the slot only, without the layout.
    pub async fn occupied(&self, slot: &SlotKey) -> EngineResult<SeatStatusMap> {
        let reservations = self.ledger.reservations_for_slot(slot).await?;
        let holdings = self.ledger.holdings_for_slot(slot).await?;
        Ok(project(std::iter::empty(), &reservations, &holdings, self.clock.now()))
    }

    pub async fn available_count(&self, performance: &Performance, slot: &SlotKey) -> EngineResult<usize> {
        let map = self.status_map_for(performance, slot).await?;
        Ok(map.values().filter(|s| **s == SeatStatus::Available).count())
    }
}
