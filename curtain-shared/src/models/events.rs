use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatsHeldEvent {
    pub holding_id: Uuid,
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub user_id: String,
    pub seat_ids: Vec<String>,
    pub held_at: i64,
    pub expires_at: i64,
}

/// Why a holding stopped claiming its seats.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    Released,
    Superseded,
    Expired,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct HoldingReleasedEvent {
    pub holding_id: Uuid,
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub seat_ids: Vec<String>,
    pub reason: ReleaseReason,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationConfirmedEvent {
    pub reservation_id: Uuid,
    pub holding_id: Uuid,
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub user_id: String,
    pub seat_ids: Vec<String>,
    pub total_price: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCancelledEvent {
    pub reservation_id: Uuid,
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub seat_ids: Vec<String>,
    pub timestamp: i64,
}

/// Envelope published for every seat-inventory transition.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    SeatsHeld(SeatsHeldEvent),
    HoldingReleased(HoldingReleasedEvent),
    ReservationConfirmed(ReservationConfirmedEvent),
    ReservationCancelled(ReservationCancelledEvent),
}

impl BookingEvent {
    pub fn performance_id(&self) -> &str {
        match self {
            BookingEvent::SeatsHeld(e) => &e.performance_id,
            BookingEvent::HoldingReleased(e) => &e.performance_id,
            BookingEvent::ReservationConfirmed(e) => &e.performance_id,
            BookingEvent::ReservationCancelled(e) => &e.performance_id,
        }
    }

    /// Topic name used by message-bus publishers.
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::SeatsHeld(_) => "holds.created",
            BookingEvent::HoldingReleased(_) => "holds.released",
            BookingEvent::ReservationConfirmed(_) => "reservations.confirmed",
            BookingEvent::ReservationCancelled(_) => "reservations.cancelled",
        }
    }

    /// Partition key: events of one slot stay ordered.
    pub fn partition_key(&self) -> String {
        let (perf, date, time) = match self {
            BookingEvent::SeatsHeld(e) => (&e.performance_id, &e.date, &e.time),
            BookingEvent::HoldingReleased(e) => (&e.performance_id, &e.date, &e.time),
            BookingEvent::ReservationConfirmed(e) => (&e.performance_id, &e.date, &e.time),
            BookingEvent::ReservationCancelled(e) => (&e.performance_id, &e.date, &e.time),
        };
        format!("{}:{}:{}", perf, date, time)
    }
}
