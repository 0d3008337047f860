use async_trait::async_trait;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use curtain_core::{EventPublisher, PublishError};
use curtain_shared::models::events::BookingEvent;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

/// Booking counters in a per-process registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub holds_created: IntCounter,
    pub hold_conflicts: IntCounter,
    pub holds_released: IntCounter,
    pub reservations_confirmed: IntCounter,
    pub reservations_cancelled: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            holds_created: counter("curtain_holds_created_total", "Holdings created")?,
            hold_conflicts: counter("curtain_hold_conflicts_total", "Hold attempts rejected for taken seats")?,
            holds_released: counter("curtain_holds_released_total", "Holdings released, superseded or purged")?,
            reservations_confirmed: counter("curtain_reservations_confirmed_total", "Reservations written")?,
            reservations_cancelled: counter("curtain_reservations_cancelled_total", "Reservations cancelled")?,
            registry,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counts every booking event as it is published.
#[async_trait]
impl EventPublisher for Metrics {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        match event {
            BookingEvent::SeatsHeld(_) => self.holds_created.inc(),
            BookingEvent::HoldingReleased(_) => self.holds_released.inc(),
            BookingEvent::ReservationConfirmed(_) => self.reservations_confirmed.inc(),
            BookingEvent::ReservationCancelled(_) => self.reservations_cancelled.inc(),
        }
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(export))
}

async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_shared::models::events::{ReleaseReason, HoldingReleasedEvent};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_events_drive_counters() {
        let metrics = Metrics::new().unwrap();
        let event = BookingEvent::HoldingReleased(HoldingReleasedEvent {
            holding_id: Uuid::new_v4(),
            performance_id: "perf-kinky-1".to_string(),
            date: "2026-02-10".to_string(),
            time: "19:30".to_string(),
            seat_ids: vec!["1층-B-1-6".to_string()],
            reason: ReleaseReason::Expired,
            timestamp: 0,
        });
        metrics.publish(&event).await.unwrap();

        assert_eq!(metrics.holds_released.get(), 1);
        let text = metrics.render().unwrap();
        assert!(text.contains("curtain_holds_released_total 1"));
    }
}
