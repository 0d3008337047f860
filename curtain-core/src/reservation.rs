use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::holding::{HeldSeat, Holding, SlotKey};

/// Stored reservation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    /// A holding that survived an infrastructure failure. Occupies its seats
    /// but still has to be paid for.
    #[serde(rename = "dr_recovered")]
    PendingRecovery,
    /// Confirmed while operating from the recovery site.
    #[serde(rename = "dr_reserved")]
    RecoveredConfirmed,
}

impl ReservationStatus {
    /// Whether the reservation still occupies its seats.
    pub fn is_active(self) -> bool {
        self != ReservationStatus::Cancelled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::PendingRecovery => "dr_recovered",
            ReservationStatus::RecoveredConfirmed => "dr_reserved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "confirmed" => Some(ReservationStatus::Confirmed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "dr_recovered" => Some(ReservationStatus::PendingRecovery),
            "dr_reserved" => Some(ReservationStatus::RecoveredConfirmed),
            _ => None,
        }
    }
}

/// A durable booking. Cancellation flips the status and keeps the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    #[serde(flatten)]
    pub slot: SlotKey,
    pub performance_title: String,
    pub venue: String,
    pub user_id: String,
    pub seats: Vec<HeldSeat>,
    pub total_price: i64,
    pub status: ReservationStatus,
    /// Holding this reservation was confirmed from, if any.
    #[serde(default)]
    pub holding_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Fields a confirmation adds on top of the holding being consumed.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub reservation_id: Uuid,
    pub performance_title: String,
    pub venue: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl ReservationDraft {
    pub fn new(performance_title: &str, venue: &str, status: ReservationStatus, now: DateTime<Utc>) -> Self {
        Self {
            reservation_id: Uuid::new_v4(),
            performance_title: performance_title.to_string(),
            venue: venue.to_string(),
            status,
            created_at: now,
        }
    }
}

impl Reservation {
    pub fn from_holding(holding: &Holding, draft: ReservationDraft) -> Self {
        Self {
            id: draft.reservation_id,
            slot: holding.slot.clone(),
            performance_title: draft.performance_title,
            venue: draft.venue,
            user_id: holding.user_id.clone(),
            seats: holding.seats.clone(),
            total_price: holding.total_price,
            status: draft.status,
            holding_id: Some(holding.holding_id),
            created_at: draft.created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recovery_statuses_keep_seats() {
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(ReservationStatus::PendingRecovery.is_active());
        assert!(ReservationStatus::RecoveredConfirmed.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
    }

    #[test]
    fn test_status_round_trips_through_storage_text() {
        for status in [
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::PendingRecovery,
            ReservationStatus::RecoveredConfirmed,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
        assert_eq!(ReservationStatus::parse("HOLDING"), None);
    }

    #[test]
    fn test_from_holding_carries_seats_and_price() {
        let now = Utc::now();
        let slot = SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap();
        let holding = Holding::new(
            slot,
            "user-42",
            vec![HeldSeat { seat_id: "1층-A-2-3".parse().unwrap(), grade: "VIP".into(), price: 170_000 }],
            now,
            Duration::minutes(10),
        );
        let draft = ReservationDraft::new("킹키부츠", "샤롯데씨어터", ReservationStatus::Confirmed, now);
        let reservation = Reservation::from_holding(&holding, draft);

        assert_eq!(reservation.user_id, "user-42");
        assert_eq!(reservation.total_price, 170_000);
        assert_eq!(reservation.holding_id, Some(holding.holding_id));
        assert_eq!(reservation.slot, holding.slot);
    }
}
