use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::StorageSeatId;
use crate::ValidationError;

/// One showing of a performance: the unit inside which seats are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub performance_id: String,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
}

impl SlotKey {
    pub fn new(performance_id: &str, date: &str, time: &str) -> Result<Self, ValidationError> {
        if performance_id.trim().is_empty() {
            return Err(ValidationError::MissingField("performanceId"));
        }
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidSlot(format!("date '{}' is not YYYY-MM-DD", date)))?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
            .map_err(|_| ValidationError::InvalidSlot(format!("time '{}' is not HH:MM", time)))?;

        Ok(Self {
            performance_id: performance_id.trim().to_string(),
            date,
            time: time.format("%H:%M").to_string(),
        })
    }

    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// A held seat with the price it was held at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldSeat {
    pub seat_id: StorageSeatId,
    pub grade: String,
    pub price: i64,
}

/// A temporary exclusive claim on seats prior to payment.
///
/// Never mutated after creation. Release and expiry remove it; a record whose
/// `expires_at` has passed is treated as absent by every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub holding_id: Uuid,
    #[serde(flatten)]
    pub slot: SlotKey,
    pub user_id: String,
    pub seats: Vec<HeldSeat>,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Holding {
    pub fn new(
        slot: SlotKey,
        user_id: &str,
        seats: Vec<HeldSeat>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let total_price = seats.iter().map(|s| s.price).sum();
        Self {
            holding_id: Uuid::new_v4(),
            slot,
            user_id: user_id.to_string(),
            seats,
            total_price,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn seat_ids(&self) -> impl Iterator<Item = &StorageSeatId> {
        self.seats.iter().map(|s| &s.seat_id)
    }
}
