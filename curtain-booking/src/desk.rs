use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use curtain_core::events::{self, publish_quietly};
use curtain_core::{Clock, EngineResult, EventPublisher, Reservation, ReservationStatus, SeatLedger};

/// How a reservation is presented to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Confirmed,
    /// Seats are kept but payment has not been completed.
    NeedsPayment,
    Cancelled,
}

impl DisplayStatus {
    pub fn label(self) -> &'static str {
        match self {
            DisplayStatus::Confirmed => "예약 확정",
            DisplayStatus::NeedsPayment => "선점 중 (결제 필요)",
            DisplayStatus::Cancelled => "취소됨",
        }
    }
}

impl From<ReservationStatus> for DisplayStatus {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Confirmed | ReservationStatus::RecoveredConfirmed => DisplayStatus::Confirmed,
            ReservationStatus::PendingRecovery => DisplayStatus::NeedsPayment,
            ReservationStatus::Cancelled => DisplayStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub display_status: DisplayStatus,
    pub display_status_label: String,
}

impl From<Reservation> for ReservationView {
    fn from(reservation: Reservation) -> Self {
        let display_status = DisplayStatus::from(reservation.status);
        Self {
            reservation,
            display_status,
            display_status_label: display_status.label().to_string(),
        }
    }
}

/// Reservation listing and cancellation.
pub struct ReservationDesk {
    ledger: Arc<dyn SeatLedger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ReservationDesk {
    pub fn new(ledger: Arc<dyn SeatLedger>, publisher: Arc<dyn EventPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            publisher,
            clock,
        }
    }

    /// Reservations of a user, newest first. Holdings are not reservations
    /// and never appear here.
    pub async fn get_user_reservations(&self, user_id: &str) -> EngineResult<Vec<ReservationView>> {
        let mut reservations = self.ledger.reservations_for_user(user_id).await?;
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations.into_iter().map(ReservationView::from).collect())
    }

    pub async fn get_reservation(&self, reservation_id: Uuid) -> EngineResult<Option<ReservationView>> {
        Ok(self
            .ledger
            .get_reservation(reservation_id)
            .await?
            .map(ReservationView::from))
    }

    /// Cancels an active reservation and frees its seats. Unknown and
    /// already-cancelled reservations return `false`.
    pub async fn cancel_reservation(&self, reservation_id: Uuid) -> EngineResult<bool> {
        match self.ledger.cancel_reservation(reservation_id).await? {
            Some(cancelled) => {
                info!(
                    reservation_id = %reservation_id,
                    user_id = %cancelled.user_id,
                    "reservation cancelled"
                );
                publish_quietly(
                    self.publisher.as_ref(),
                    events::reservation_cancelled(&cancelled, self.clock.now()),
                )
                .await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
