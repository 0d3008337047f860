use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::holding::{Holding, SlotKey};
use crate::reservation::{Reservation, ReservationDraft};
use crate::seat::StorageSeatId;

/// Failures of the backing store itself, never of the caller's request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an all-or-none seat claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Every seat that was held or reserved by someone else; nothing was written.
    Conflict(Vec<StorageSeatId>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed(Reservation),
    NotFound,
    /// The holding exists but its deadline passed; no reservation was written.
    Expired(Holding),
}

/// Authoritative owner of seat claims for every slot.
///
/// Implementations make `claim_seats`, `confirm_holding` and
/// `insert_reservation` atomic per slot: two callers racing for an
/// overlapping seat set can never both succeed. Holdings whose `expires_at`
/// is before `now` do not block a claim.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Claims every seat of `holding` or none of them.
    async fn claim_seats(&self, holding: &Holding, now: DateTime<Utc>) -> StoreResult<ClaimOutcome>;

    /// Raw lookup. Expired holdings are returned until purged; callers decide.
    async fn get_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>>;

    async fn holdings_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Holding>>;

    async fn holdings_for_user(&self, user_id: &str) -> StoreResult<Vec<Holding>>;

    /// Deletes the holding and frees its seats. Returns what was removed.
    async fn remove_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>>;

    /// Turns an unexpired holding into a reservation in one step.
    async fn confirm_holding(
        &self,
        holding_id: Uuid,
        draft: ReservationDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<ConfirmOutcome>;

    /// Writes a reservation that does not come from a live holding, such as
    /// one restored after an outage. Subject to the same exclusivity.
    async fn insert_reservation(&self, reservation: &Reservation, now: DateTime<Utc>) -> StoreResult<ClaimOutcome>;

    async fn get_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>>;

    async fn reservations_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Reservation>>;

    async fn reservations_for_user(&self, user_id: &str) -> StoreResult<Vec<Reservation>>;

    /// Marks an active reservation cancelled and frees its seats.
    /// Returns the updated record, or `None` if absent or already cancelled.
    async fn cancel_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Drops holding records that expired before `cutoff`. Returns them.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Holding>>;
}
