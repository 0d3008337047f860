use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curtain_core::{
    ClaimOutcome, ConfirmOutcome, Holding, Reservation, ReservationDraft, ReservationStatus,
    SeatLedger, SlotKey, StorageSeatId, StoreResult,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Who currently owns a seat inside one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Holding { id: Uuid, expires_at: DateTime<Utc> },
    Reservation(Uuid),
}

impl Claim {
    fn blocks_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Claim::Reservation(_) => true,
            Claim::Holding { expires_at, .. } => now <= *expires_at,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    holdings: HashMap<Uuid, Holding>,
    reservations: HashMap<Uuid, Reservation>,
    claims: HashMap<SlotKey, HashMap<StorageSeatId, Claim>>,
    holdings_by_slot: HashMap<SlotKey, HashSet<Uuid>>,
    holdings_by_user: HashMap<String, HashSet<Uuid>>,
    reservations_by_slot: HashMap<SlotKey, Vec<Uuid>>,
    reservations_by_user: HashMap<String, Vec<Uuid>>,
}

impl LedgerState {
    fn blocked<'a>(
        &self,
        slot: &SlotKey,
        seats: impl Iterator<Item = &'a StorageSeatId>,
        now: DateTime<Utc>,
    ) -> Vec<StorageSeatId> {
        let Some(claims) = self.claims.get(slot) else {
            return Vec::new();
        };
        seats
            .filter(|seat| claims.get(*seat).is_some_and(|c| c.blocks_at(now)))
            .cloned()
            .collect()
    }

    fn write_claims<'a>(&mut self, slot: &SlotKey, seats: impl Iterator<Item = &'a StorageSeatId>, claim: Claim) {
        let claims = self.claims.entry(slot.clone()).or_default();
        for seat in seats {
            claims.insert(seat.clone(), claim);
        }
    }

    /// Frees only the seats still owned by `owner`; a seat re-claimed by
    /// someone else after expiry is left alone.
    fn drop_claims<'a>(&mut self, slot: &SlotKey, seats: impl Iterator<Item = &'a StorageSeatId>, owner: Claim) {
        if let Some(claims) = self.claims.get_mut(slot) {
            for seat in seats {
                if claims.get(seat) == Some(&owner) {
                    claims.remove(seat);
                }
            }
            if claims.is_empty() {
                self.claims.remove(slot);
            }
        }
    }

    fn index_holding(&mut self, holding: &Holding) {
        self.holdings_by_slot
            .entry(holding.slot.clone())
            .or_default()
            .insert(holding.holding_id);
        self.holdings_by_user
            .entry(holding.user_id.clone())
            .or_default()
            .insert(holding.holding_id);
    }

    fn unindex_holding(&mut self, holding: &Holding) {
        if let Some(ids) = self.holdings_by_slot.get_mut(&holding.slot) {
            ids.remove(&holding.holding_id);
            if ids.is_empty() {
                self.holdings_by_slot.remove(&holding.slot);
            }
        }
        if let Some(ids) = self.holdings_by_user.get_mut(&holding.user_id) {
            ids.remove(&holding.holding_id);
            if ids.is_empty() {
                self.holdings_by_user.remove(&holding.user_id);
            }
        }
    }

    fn take_holding(&mut self, holding_id: Uuid) -> Option<Holding> {
        let holding = self.holdings.remove(&holding_id)?;
        self.drop_claims(
            &holding.slot,
            holding.seat_ids(),
            Claim::Holding {
                id: holding.holding_id,
                expires_at: holding.expires_at,
            },
        );
        self.unindex_holding(&holding);
        Some(holding)
    }

    fn store_reservation(&mut self, reservation: Reservation) {
        self.reservations_by_slot
            .entry(reservation.slot.clone())
            .or_default()
            .push(reservation.id);
        self.reservations_by_user
            .entry(reservation.user_id.clone())
            .or_default()
            .push(reservation.id);
        self.reservations.insert(reservation.id, reservation);
    }

    fn collect_holdings(&self, ids: Option<&HashSet<Uuid>>) -> Vec<Holding> {
        let mut holdings: Vec<Holding> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.holdings.get(id).cloned())
            .collect();
        holdings.sort_by_key(|h| h.created_at);
        holdings
    }

    fn collect_reservations(&self, ids: Option<&Vec<Uuid>>) -> Vec<Reservation> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id).cloned())
            .collect()
    }
}

/// Single-process ledger. One write lock serializes every claim, which is
/// what makes the claim check and the claim write a single step.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }
}

#[async_trait]
impl SeatLedger for MemoryLedger {
    async fn claim_seats(&self, holding: &Holding, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let mut state = self.state.write().await;

        let blocked = state.blocked(&holding.slot, holding.seat_ids(), now);
        if !blocked.is_empty() {
            debug!(holding_id = %holding.holding_id, blocked = blocked.len(), "claim rejected");
            return Ok(ClaimOutcome::Conflict(blocked));
        }

        state.write_claims(
            &holding.slot,
            holding.seat_ids(),
            Claim::Holding {
                id: holding.holding_id,
                expires_at: holding.expires_at,
            },
        );
        state.index_holding(holding);
        state.holdings.insert(holding.holding_id, holding.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn get_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        Ok(self.state.read().await.holdings.get(&holding_id).cloned())
    }

    async fn holdings_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Holding>> {
        let state = self.state.read().await;
        Ok(state.collect_holdings(state.holdings_by_slot.get(slot)))
    }

    async fn holdings_for_user(&self, user_id: &str) -> StoreResult<Vec<Holding>> {
        let state = self.state.read().await;
        Ok(state.collect_holdings(state.holdings_by_user.get(user_id)))
    }

    async fn remove_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        Ok(self.state.write().await.take_holding(holding_id))
    }

    async fn confirm_holding(
        &self,
        holding_id: Uuid,
        draft: ReservationDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<ConfirmOutcome> {
        let mut state = self.state.write().await;

        let Some(holding) = state.holdings.get(&holding_id).cloned() else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if holding.is_expired_at(now) {
            return Ok(ConfirmOutcome::Expired(holding));
        }

        let reservation = Reservation::from_holding(&holding, draft);
        state.take_holding(holding_id);
        state.write_claims(&holding.slot, holding.seat_ids(), Claim::Reservation(reservation.id));
        state.store_reservation(reservation.clone());
        Ok(ConfirmOutcome::Confirmed(reservation))
    }

    async fn insert_reservation(&self, reservation: &Reservation, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let mut state = self.state.write().await;
        let seats: Vec<&StorageSeatId> = reservation.seats.iter().map(|s| &s.seat_id).collect();

        if reservation.is_active() {
            let blocked = state.blocked(&reservation.slot, seats.iter().copied(), now);
            if !blocked.is_empty() {
                return Ok(ClaimOutcome::Conflict(blocked));
            }
            state.write_claims(&reservation.slot, seats.into_iter(), Claim::Reservation(reservation.id));
        }

        state.store_reservation(reservation.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(&reservation_id).cloned())
    }

    async fn reservations_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state.collect_reservations(state.reservations_by_slot.get(slot)))
    }

    async fn reservations_for_user(&self, user_id: &str) -> StoreResult<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state.collect_reservations(state.reservations_by_user.get(user_id)))
    }

    async fn cancel_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let mut state = self.state.write().await;

        let cancelled = match state.reservations.get_mut(&reservation_id) {
            Some(reservation) if reservation.is_active() => {
                reservation.status = ReservationStatus::Cancelled;
                reservation.clone()
            }
            _ => return Ok(None),
        };

        state.drop_claims(
            &cancelled.slot,
            cancelled.seats.iter().map(|s| &s.seat_id),
            Claim::Reservation(reservation_id),
        );
        Ok(Some(cancelled))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Holding>> {
        let mut state = self.state.write().await;

        let stale: Vec<Uuid> = state
            .holdings
            .values()
            .filter(|h| h.expires_at < cutoff)
            .map(|h| h.holding_id)
            .collect();

        Ok(stale
            .into_iter()
            .filter_map(|id| state.take_holding(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use curtain_core::HeldSeat;
    use std::sync::Arc;

    fn slot() -> SlotKey {
        SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap()
    }

    fn holding(user: &str, seats: &[&str], now: DateTime<Utc>) -> Holding {
        let seats = seats
            .iter()
            .map(|s| HeldSeat {
                seat_id: s.parse().unwrap(),
                grade: "VIP".to_string(),
                price: 170_000,
            })
            .collect();
        Holding::new(slot(), user, seats, now, Duration::minutes(10))
    }

    fn draft(now: DateTime<Utc>) -> ReservationDraft {
        ReservationDraft::new("킹키부츠", "샤롯데씨어터", ReservationStatus::Confirmed, now)
    }

    #[tokio::test]
    async fn test_overlapping_claim_reports_every_blocked_seat() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();

        let first = holding("user-42", &["1층-B-1-6", "1층-B-1-7"], now);
        assert_eq!(ledger.claim_seats(&first, now).await.unwrap(), ClaimOutcome::Claimed);

        let second = holding("user-7", &["1층-B-1-5", "1층-B-1-6", "1층-B-1-7"], now);
        match ledger.claim_seats(&second, now).await.unwrap() {
            ClaimOutcome::Conflict(seats) => {
                let mut seats: Vec<String> = seats.iter().map(|s| s.to_string()).collect();
                seats.sort();
                assert_eq!(seats, vec!["1층-B-1-6", "1층-B-1-7"]);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // Nothing of the rejected claim was written.
        assert!(ledger.get_holding(second.holding_id).await.unwrap().is_none());
        let third = holding("user-7", &["1층-B-1-5"], now);
        assert_eq!(ledger.claim_seats(&third, now).await.unwrap(), ClaimOutcome::Claimed);
    }

    #[tokio::test]
    async fn test_expired_claim_is_free_but_record_stays_until_purge() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let stale = holding("user-42", &["1층-B-1-6"], now);
        ledger.claim_seats(&stale, now).await.unwrap();

        let later = stale.expires_at + Duration::seconds(1);
        let fresh = holding("user-7", &["1층-B-1-6"], later);
        assert_eq!(ledger.claim_seats(&fresh, later).await.unwrap(), ClaimOutcome::Claimed);
        assert!(ledger.get_holding(stale.holding_id).await.unwrap().is_some());

        // Removing the stale record must not free the seat the new holder owns.
        ledger.remove_holding(stale.holding_id).await.unwrap();
        let intruder = holding("user-9", &["1층-B-1-6"], later);
        assert!(matches!(
            ledger.claim_seats(&intruder, later).await.unwrap(),
            ClaimOutcome::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_confirm_turns_holding_into_reservation() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let held = holding("user-42", &["1층-B-1-6", "1층-B-1-7"], now);
        ledger.claim_seats(&held, now).await.unwrap();

        let reservation = match ledger.confirm_holding(held.holding_id, draft(now), now).await.unwrap() {
            ConfirmOutcome::Confirmed(r) => r,
            other => panic!("expected confirmation, got {:?}", other),
        };
        assert_eq!(reservation.holding_id, Some(held.holding_id));
        assert!(ledger.get_holding(held.holding_id).await.unwrap().is_none());
        assert_eq!(ledger.reservations_for_slot(&slot()).await.unwrap().len(), 1);

        // Reserved seats stay blocked long after the holding deadline.
        let much_later = now + Duration::days(1);
        let other = holding("user-7", &["1층-B-1-7"], much_later);
        assert!(matches!(
            ledger.claim_seats(&other, much_later).await.unwrap(),
            ClaimOutcome::Conflict(_)
        ));

        assert_eq!(
            ledger.confirm_holding(held.holding_id, draft(now), now).await.unwrap(),
            ConfirmOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_confirm_after_deadline_is_expired() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let held = holding("user-42", &["1층-B-1-6"], now);
        ledger.claim_seats(&held, now).await.unwrap();

        let late = held.expires_at + Duration::milliseconds(1);
        let outcome = ledger.confirm_holding(held.holding_id, draft(late), late).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Expired(_)));
        assert!(ledger.reservations_for_user("user-42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_frees_seats_once() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let held = holding("user-42", &["1층-B-1-6"], now);
        ledger.claim_seats(&held, now).await.unwrap();
        let ConfirmOutcome::Confirmed(reservation) =
            ledger.confirm_holding(held.holding_id, draft(now), now).await.unwrap()
        else {
            panic!("confirmation failed");
        };

        let cancelled = ledger.cancel_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(ledger.cancel_reservation(reservation.id).await.unwrap().is_none());
        assert!(ledger.cancel_reservation(Uuid::new_v4()).await.unwrap().is_none());

        let next = holding("user-7", &["1층-B-1-6"], now);
        assert_eq!(ledger.claim_seats(&next, now).await.unwrap(), ClaimOutcome::Claimed);
        // Cancelled records remain queryable.
        assert_eq!(ledger.reservations_for_user("user-42").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restored_reservation_respects_existing_claims() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let held = holding("user-42", &["1층-B-1-6"], now);
        ledger.claim_seats(&held, now).await.unwrap();

        let mut restored = Reservation::from_holding(
            &holding("user-7", &["1층-B-1-6"], now),
            ReservationDraft::new("킹키부츠", "샤롯데씨어터", ReservationStatus::PendingRecovery, now),
        );
        restored.holding_id = None;
        assert!(matches!(
            ledger.insert_reservation(&restored, now).await.unwrap(),
            ClaimOutcome::Conflict(_)
        ));

        ledger.remove_holding(held.holding_id).await.unwrap();
        assert_eq!(ledger.insert_reservation(&restored, now).await.unwrap(), ClaimOutcome::Claimed);
        assert!(ledger.get_reservation(restored.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_drops_only_expired_records() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let old = holding("user-42", &["1층-A-1-1"], now - Duration::hours(1));
        let live = holding("user-42", &["1층-A-1-2"], now);
        ledger.claim_seats(&old, now - Duration::hours(1)).await.unwrap();
        ledger.claim_seats(&live, now).await.unwrap();

        let purged = ledger.purge_expired(now).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].holding_id, old.holding_id);
        assert_eq!(ledger.holdings_for_user("user-42").await.unwrap().len(), 1);
        assert_eq!(ledger.holdings_for_slot(&slot()).await.unwrap()[0].holding_id, live.holding_id);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let ledger = Arc::new(MemoryLedger::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let attempt = holding(&format!("user-{i}"), &["1층-B-1-6", "1층-B-1-7"], now);
                ledger.claim_seats(&attempt, now).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Claimed {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.holdings_for_slot(&slot()).await.unwrap().len(), 1);
    }
}
