use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use curtain_core::{EventPublisher, PublishError};
use curtain_shared::models::events::BookingEvent;
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

/// Relays booking events to live SSE subscribers. Having no subscriber is
/// not a failure.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BookingEvent>,
}

impl BroadcastPublisher {
    pub fn new(tx: broadcast::Sender<BookingEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/performances/{id}/stream", get(seat_stream))
}

fn event_name(event: &BookingEvent) -> &'static str {
    match event {
        BookingEvent::SeatsHeld(_) => "seats_held",
        BookingEvent::HoldingReleased(_) => "holding_released",
        BookingEvent::ReservationConfirmed(_) => "reservation_confirmed",
        BookingEvent::ReservationCancelled(_) => "reservation_cancelled",
    }
}

/// GET /v1/performances/{id}/stream
async fn seat_stream(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let performance_id = performance_id.clone();
        async move {
            // Lagged receivers skip what they missed.
            let event = result.ok()?;
            if event.performance_id() != performance_id {
                return None;
            }
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().event(event_name(&event)).data(data)))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
