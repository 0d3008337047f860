pub mod clock;
pub mod events;
pub mod holding;
pub mod identity;
pub mod repository;
pub mod reservation;
pub mod seat;

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventPublisher, FanoutPublisher, PublishError, TracingPublisher};
pub use holding::{HeldSeat, Holding, SlotKey};
pub use identity::{IdentityError, Role, TokenVerifier, VerifiedIdentity};
pub use repository::{ClaimOutcome, ConfirmOutcome, SeatLedger, StoreError, StoreResult};
pub use reservation::{Reservation, ReservationDraft, ReservationStatus};
pub use seat::{DisplaySeat, DisplaySeatNumber, SeatStatus, StorageSeatId};

/// Caller mistakes. Surfaced immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("party size is required and must be at least 1")]
    MissingPartySize,
    #[error("party size {requested} exceeds the maximum of {max}")]
    PartySizeExceeded { requested: u32, max: u32 },
    #[error("at least one seat is required")]
    EmptySeatList,
    #[error("seat {0} was requested more than once")]
    DuplicateSeat(String),
    #[error("malformed seat id: {0}")]
    MalformedSeatId(String),
    #[error("{seat_id} is not a seat in this venue")]
    UnknownSeat {
        seat_id: String,
        /// Storage id the number maps to when read as a display number.
        display_hint: Option<String>,
    },
    #[error("invalid slot: {0}")]
    InvalidSlot(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ValidationError {
    /// Stable machine-readable code for the boundary layers.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingPartySize => "MISSING_COUNT",
            ValidationError::PartySizeExceeded { .. } => "PARTY_SIZE_EXCEEDED",
            ValidationError::EmptySeatList => "EMPTY_SEAT_LIST",
            ValidationError::DuplicateSeat(_) => "DUPLICATE_SEAT",
            ValidationError::MalformedSeatId(_) => "MALFORMED_SEAT_ID",
            ValidationError::UnknownSeat { .. } => "UNKNOWN_SEAT",
            ValidationError::InvalidSlot(_) => "INVALID_SLOT",
            ValidationError::MissingField(_) => "MISSING_FIELD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Performance,
    Schedule,
    Venue,
    Seat,
    Holding,
    Reservation,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Performance => "Performance",
            ResourceKind::Schedule => "Schedule",
            ResourceKind::Venue => "Venue",
            ResourceKind::Seat => "Seat",
            ResourceKind::Holding => "Holding",
            ResourceKind::Reservation => "Reservation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Seats unavailable: {}", join_seats(.unavailable))]
    Conflict { unavailable: Vec<StorageSeatId> },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Holding {holding_id} expired at {expired_at}")]
    Expired {
        holding_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(kind: ResourceKind, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(e) => e.code(),
            EngineError::Conflict { .. } => "SEATS_UNAVAILABLE",
            EngineError::NotFound { kind, .. } => match kind {
                ResourceKind::Performance => "PERFORMANCE_NOT_FOUND",
                ResourceKind::Schedule => "SCHEDULE_NOT_FOUND",
                ResourceKind::Venue => "VENUE_NOT_FOUND",
                ResourceKind::Seat => "SEAT_NOT_FOUND",
                ResourceKind::Holding => "HOLDING_NOT_FOUND",
                ResourceKind::Reservation => "RESERVATION_NOT_FOUND",
            },
            EngineError::Expired { .. } => "HOLDING_EXPIRED",
            EngineError::Storage(_) => "STORAGE_FAILURE",
        }
    }
}

fn join_seats(seats: &[StorageSeatId]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_lists_every_seat() {
        let err = EngineError::Conflict {
            unavailable: vec![
                "1층-B-1-6".parse().unwrap(),
                "1층-B-1-7".parse().unwrap(),
            ],
        };
        assert_eq!(err.to_string(), "Seats unavailable: 1층-B-1-6, 1층-B-1-7");
        assert_eq!(err.code(), "SEATS_UNAVAILABLE");
    }

    #[test]
    fn test_codes_distinguish_missing_and_expired() {
        let missing = EngineError::not_found(ResourceKind::Holding, Uuid::nil());
        let expired = EngineError::Expired {
            holding_id: Uuid::nil(),
            expired_at: Utc::now(),
        };
        assert_ne!(missing.code(), expired.code());
        assert_eq!(
            EngineError::from(ValidationError::MissingPartySize).code(),
            "MISSING_COUNT"
        );
    }
}
