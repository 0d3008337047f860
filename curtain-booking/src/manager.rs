use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use curtain_catalog::{CatalogRepository, Performance, VenueLayout};
use curtain_core::events::{self, publish_quietly};
use curtain_core::{
    ClaimOutcome, Clock, ConfirmOutcome, DisplaySeatNumber, EngineError, EngineResult,
    EventPublisher, HeldSeat, Holding, Reservation, ReservationDraft, ReservationStatus,
    ResourceKind, SeatLedger, SlotKey, StorageSeatId, ValidationError,
};
use curtain_seating::AvailabilityProjector;
use curtain_shared::models::events::ReleaseReason;

use crate::policy::HoldPolicy;

pub const DEFAULT_HOLD_TTL_SECONDS: i64 = 600;

/// Tunables of the holding path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldRules {
    pub ttl: Duration,
    pub max_party_size: u32,
}

impl Default for HoldRules {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_HOLD_TTL_SECONDS),
            max_party_size: curtain_seating::DEFAULT_MAX_PARTY_SIZE,
        }
    }
}

/// Parses raw storage ids as sent by callers.
pub fn parse_seat_ids(raw: &[String]) -> Result<Vec<StorageSeatId>, ValidationError> {
    raw.iter().map(|s| s.parse()).collect()
}

/// Seat of a holding with presentation details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSeatView {
    pub seat_id: StorageSeatId,
    pub grade: String,
    pub price: i64,
    pub color: Option<String>,
    pub display_number: DisplaySeatNumber,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDetail {
    pub holding_id: Uuid,
    pub performance_id: String,
    pub performance_title: String,
    pub venue: String,
    pub date: String,
    pub time: String,
    pub user_id: String,
    pub seats: Vec<HoldingSeatView>,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
}

pub struct HoldingManager {
    catalog: Arc<dyn CatalogRepository>,
    ledger: Arc<dyn SeatLedger>,
    projector: AvailabilityProjector,
    policy: Arc<dyn HoldPolicy>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    rules: HoldRules,
}

impl HoldingManager {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        ledger: Arc<dyn SeatLedger>,
        policy: Arc<dyn HoldPolicy>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        rules: HoldRules,
    ) -> Self {
        let projector = AvailabilityProjector::new(catalog.clone(), ledger.clone(), clock.clone());
        Self {
            catalog,
            ledger,
            projector,
            policy,
            publisher,
            clock,
            rules,
        }
    }

    pub fn rules(&self) -> HoldRules {
        self.rules
    }

    pub fn projector(&self) -> &AvailabilityProjector {
        &self.projector
    }

    async fn performance(&self, performance_id: &str) -> EngineResult<Performance> {
        self.catalog
            .get_performance(performance_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::Performance, performance_id))
    }

    fn validate_seats(&self, seats: &[StorageSeatId], layout: &VenueLayout<'_>) -> Result<(), ValidationError> {
        if seats.is_empty() {
            return Err(ValidationError::EmptySeatList);
        }
        if seats.len() as u32 > self.rules.max_party_size {
            return Err(ValidationError::PartySizeExceeded {
                requested: seats.len() as u32,
                max: self.rules.max_party_size,
            });
        }

        let mut seen = HashSet::new();
        for seat in seats {
            if !seen.insert(seat) {
                return Err(ValidationError::DuplicateSeat(seat.to_string()));
            }
            if !layout.contains(seat) {
                return Err(ValidationError::UnknownSeat {
                    seat_id: seat.to_string(),
                    display_hint: layout.display_reading(seat).map(|s| s.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Places a time-limited exclusive hold on `seats` for `user_id`.
    ///
    /// All seats are held or none. Seats held or reserved by anyone,
    /// including the caller, are reported in the conflict.
    pub async fn create_holding(
        &self,
        slot: &SlotKey,
        seats: &[StorageSeatId],
        user_id: &str,
    ) -> EngineResult<Holding> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("userId").into());
        }
        let performance = self.performance(&slot.performance_id).await?;
        let layout = VenueLayout::new(&performance.sections);
        self.validate_seats(seats, &layout)?;

        let held: Vec<HeldSeat> = seats
            .iter()
            .map(|seat| {
                let grade = layout.resolve_grade(seat)?.to_string();
                let price = performance.seat_grade(&grade).map(|g| g.price).unwrap_or(0);
                Ok(HeldSeat {
                    seat_id: seat.clone(),
                    grade,
                    price,
                })
            })
            .collect::<EngineResult<_>>()?;

        self.supersede_for(user_id, slot).await?;

        // Cheap read first; the ledger claim below is what actually decides.
        let occupied = self.projector.occupied(slot).await?;
        let taken: Vec<StorageSeatId> = seats.iter().filter(|s| occupied.contains_key(*s)).cloned().collect();
        if !taken.is_empty() {
            warn!(performance_id = %slot.performance_id, user_id, seats = ?taken, "hold rejected by pre-check");
            return Err(EngineError::Conflict { unavailable: taken });
        }

        let now = self.clock.now();
        let holding = Holding::new(slot.clone(), user_id, held, now, self.rules.ttl);
        match self.ledger.claim_seats(&holding, now).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::Conflict(unavailable) => {
                warn!(performance_id = %slot.performance_id, user_id, seats = ?unavailable, "hold lost the race");
                return Err(EngineError::Conflict { unavailable });
            }
        }

        info!(
            holding_id = %holding.holding_id,
            performance_id = %slot.performance_id,
            user_id,
            seats = holding.seats.len(),
            expires_at = %holding.expires_at,
            "seats held"
        );
        publish_quietly(self.publisher.as_ref(), events::seats_held(&holding)).await;
        Ok(holding)
    }

    async fn supersede_for(&self, user_id: &str, slot: &SlotKey) -> EngineResult<()> {
        let now = self.clock.now();
        for existing in self.ledger.holdings_for_user(user_id).await? {
            if existing.is_expired_at(now) || !self.policy.supersedes(&existing, slot) {
                continue;
            }
            if let Some(removed) = self.ledger.remove_holding(existing.holding_id).await? {
                info!(holding_id = %removed.holding_id, user_id, policy = self.policy.name(), "holding superseded");
                publish_quietly(
                    self.publisher.as_ref(),
                    events::holding_released(&removed, ReleaseReason::Superseded, now),
                )
                .await;
            }
        }
        Ok(())
    }

    /// Releases an active holding. Unknown, expired and already released
    /// holdings return `false`.
    pub async fn release_holding(&self, holding_id: Uuid) -> EngineResult<bool> {
        let now = self.clock.now();
        match self.ledger.get_holding(holding_id).await? {
            Some(h) if !h.is_expired_at(now) => {}
            _ => return Ok(false),
        }
        match self.ledger.remove_holding(holding_id).await? {
            Some(removed) => {
                info!(holding_id = %holding_id, user_id = %removed.user_id, "holding released");
                publish_quietly(
                    self.publisher.as_ref(),
                    events::holding_released(&removed, ReleaseReason::Released, now),
                )
                .await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Releases every active holding of `user_id`.
    pub async fn release_holdings_by_user(&self, user_id: &str) -> EngineResult<Vec<Uuid>> {
        let now = self.clock.now();
        let mut released = Vec::new();
        for holding in self.ledger.holdings_for_user(user_id).await? {
            if holding.is_expired_at(now) {
                continue;
            }
            if let Some(removed) = self.ledger.remove_holding(holding.holding_id).await? {
                publish_quietly(
                    self.publisher.as_ref(),
                    events::holding_released(&removed, ReleaseReason::Released, now),
                )
                .await;
                released.push(removed.holding_id);
            }
        }
        if !released.is_empty() {
            info!(user_id, count = released.len(), "user holdings released");
        }
        Ok(released)
    }

    /// Active holding by id. Expired holdings read as absent.
    pub async fn get_holding(&self, holding_id: Uuid) -> EngineResult<Option<Holding>> {
        let now = self.clock.now();
        Ok(self
            .ledger
            .get_holding(holding_id)
            .await?
            .filter(|h| !h.is_expired_at(now)))
    }

    /// Active holdings of a user, soonest expiry first.
    pub async fn holdings_for_user(&self, user_id: &str) -> EngineResult<Vec<Holding>> {
        let now = self.clock.now();
        let mut holdings: Vec<Holding> = self
            .ledger
            .holdings_for_user(user_id)
            .await?
            .into_iter()
            .filter(|h| !h.is_expired_at(now))
            .collect();
        holdings.sort_by_key(|h| h.expires_at);
        Ok(holdings)
    }

    /// Holding with grade colors, display numbers and performance details.
    pub async fn holding_detail(&self, holding_id: Uuid) -> EngineResult<Option<HoldingDetail>> {
        let Some(holding) = self.get_holding(holding_id).await? else {
            return Ok(None);
        };
        let performance = self.performance(&holding.slot.performance_id).await?;
        let layout = VenueLayout::new(&performance.sections);
        let now = self.clock.now();

        let seats = holding
            .seats
            .iter()
            .map(|s| {
                let display_number = layout.display_number(&s.seat_id);
                HoldingSeatView {
                    seat_id: s.seat_id.clone(),
                    grade: s.grade.clone(),
                    price: s.price,
                    color: performance.seat_grade(&s.grade).map(|g| g.color.clone()),
                    display_number,
                    label: format!(
                        "{} {}구역 {}열 {}번 ({}석)",
                        s.seat_id.floor, s.seat_id.section, s.seat_id.row, display_number, s.grade
                    ),
                }
            })
            .collect();

        Ok(Some(HoldingDetail {
            holding_id: holding.holding_id,
            performance_id: holding.slot.performance_id.clone(),
            performance_title: performance.title.clone(),
            venue: performance.venue.clone(),
            date: holding.slot.date_string(),
            time: holding.slot.time.clone(),
            user_id: holding.user_id.clone(),
            seats,
            total_price: holding.total_price,
            created_at: holding.created_at,
            expires_at: holding.expires_at,
            remaining_seconds: (holding.expires_at - now).num_seconds().max(0),
        }))
    }

    /// Turns an active holding into a confirmed reservation.
    ///
    /// Title and venue default to the catalog entry of the performance.
    pub async fn confirm_holding(
        &self,
        holding_id: Uuid,
        performance_title: Option<&str>,
        venue: Option<&str>,
    ) -> EngineResult<Reservation> {
        let (title, venue) = match (performance_title, venue) {
            (Some(title), Some(venue)) => (title.to_string(), venue.to_string()),
            _ => {
                let Some(holding) = self.ledger.get_holding(holding_id).await? else {
                    return Err(EngineError::not_found(ResourceKind::Holding, holding_id));
                };
                let performance = self.performance(&holding.slot.performance_id).await?;
                (
                    performance_title.map(str::to_string).unwrap_or(performance.title),
                    venue.map(str::to_string).unwrap_or(performance.venue),
                )
            }
        };

        let now = self.clock.now();
        let draft = ReservationDraft::new(&title, &venue, ReservationStatus::Confirmed, now);
        match self.ledger.confirm_holding(holding_id, draft, now).await? {
            ConfirmOutcome::Confirmed(reservation) => {
                info!(
                    reservation_id = %reservation.id,
                    holding_id = %holding_id,
                    user_id = %reservation.user_id,
                    total_price = reservation.total_price,
                    "holding confirmed"
                );
                publish_quietly(self.publisher.as_ref(), events::reservation_confirmed(&reservation)).await;
                Ok(reservation)
            }
            ConfirmOutcome::NotFound => Err(EngineError::not_found(ResourceKind::Holding, holding_id)),
            ConfirmOutcome::Expired(holding) => {
                warn!(holding_id = %holding_id, expired_at = %holding.expires_at, "confirmation after expiry");
                Err(EngineError::Expired {
                    holding_id,
                    expired_at: holding.expires_at,
                })
            }
        }
    }

    /// Writes a reservation carried over from before an outage. The seats
    /// must still be free.
    pub async fn restore_reservation(&self, reservation: Reservation) -> EngineResult<Reservation> {
        let performance = self.performance(&reservation.slot.performance_id).await?;
        let layout = VenueLayout::new(&performance.sections);
        let ids: Vec<StorageSeatId> = reservation.seats.iter().map(|s| s.seat_id.clone()).collect();
        if let Some(unknown) = ids.iter().find(|s| !layout.contains(s)) {
            return Err(ValidationError::UnknownSeat {
                seat_id: unknown.to_string(),
                display_hint: None,
            }
            .into());
        }

        let now = self.clock.now();
        match self.ledger.insert_reservation(&reservation, now).await? {
            ClaimOutcome::Claimed => {
                info!(
                    reservation_id = %reservation.id,
                    status = reservation.status.as_str(),
                    "reservation restored"
                );
                publish_quietly(self.publisher.as_ref(), events::reservation_confirmed(&reservation)).await;
                Ok(reservation)
            }
            ClaimOutcome::Conflict(unavailable) => Err(EngineError::Conflict { unavailable }),
        }
    }
}
