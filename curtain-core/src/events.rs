use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curtain_shared::models::events::{
    BookingEvent, HoldingReleasedEvent, ReleaseReason, ReservationCancelledEvent,
    ReservationConfirmedEvent, SeatsHeldEvent,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::holding::Holding;
use crate::reservation::Reservation;

#[derive(Debug, thiserror::Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Sink for seat-inventory transitions. Publishing happens after the ledger
/// write has succeeded and never rolls it back.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError>;
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        info!(
            topic = event.topic(),
            key = %event.partition_key(),
            "booking event"
        );
        Ok(())
    }
}

/// Delivers to several sinks. One failing sink does not stop the rest.
#[derive(Default, Clone)]
pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                warn!(topic = event.topic(), error = %e, "event sink failed");
                failures.push(e.0);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError(failures.join("; ")))
        }
    }
}

/// Publishes and logs a failure instead of returning it.
pub async fn publish_quietly(publisher: &dyn EventPublisher, event: BookingEvent) {
    if let Err(e) = publisher.publish(&event).await {
        warn!(topic = event.topic(), error = %e, "dropping booking event");
    }
}

// ============================================================================
// Builders
// ============================================================================

fn seat_strings<'a>(ids: impl Iterator<Item = &'a crate::seat::StorageSeatId>) -> Vec<String> {
    ids.map(|s| s.to_string()).collect()
}

pub fn seats_held(holding: &Holding) -> BookingEvent {
    BookingEvent::SeatsHeld(SeatsHeldEvent {
        holding_id: holding.holding_id,
        performance_id: holding.slot.performance_id.clone(),
        date: holding.slot.date_string(),
        time: holding.slot.time.clone(),
        user_id: holding.user_id.clone(),
        seat_ids: seat_strings(holding.seat_ids()),
        held_at: holding.created_at.timestamp(),
        expires_at: holding.expires_at.timestamp(),
    })
}

pub fn holding_released(holding: &Holding, reason: ReleaseReason, at: DateTime<Utc>) -> BookingEvent {
    BookingEvent::HoldingReleased(HoldingReleasedEvent {
        holding_id: holding.holding_id,
        performance_id: holding.slot.performance_id.clone(),
        date: holding.slot.date_string(),
        time: holding.slot.time.clone(),
        seat_ids: seat_strings(holding.seat_ids()),
        reason,
        timestamp: at.timestamp(),
    })
}

pub fn reservation_confirmed(reservation: &Reservation) -> BookingEvent {
    BookingEvent::ReservationConfirmed(ReservationConfirmedEvent {
        reservation_id: reservation.id,
        holding_id: reservation.holding_id.unwrap_or_default(),
        performance_id: reservation.slot.performance_id.clone(),
        date: reservation.slot.date_string(),
        time: reservation.slot.time.clone(),
        user_id: reservation.user_id.clone(),
        seat_ids: seat_strings(reservation.seats.iter().map(|s| &s.seat_id)),
        total_price: reservation.total_price,
        timestamp: reservation.created_at.timestamp(),
    })
}

pub fn reservation_cancelled(reservation: &Reservation, at: DateTime<Utc>) -> BookingEvent {
    BookingEvent::ReservationCancelled(ReservationCancelledEvent {
        reservation_id: reservation.id,
        performance_id: reservation.slot.performance_id.clone(),
        date: reservation.slot.date_string(),
        time: reservation.slot.time.clone(),
        seat_ids: seat_strings(reservation.seats.iter().map(|s| &s.seat_id)),
        timestamp: at.timestamp(),
    })
}
