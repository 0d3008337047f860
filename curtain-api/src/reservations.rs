use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use curtain_booking::ReservationView;
use curtain_core::{EngineError, Reservation, ResourceKind, Role, VerifiedIdentity};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub reservation_id: Uuid,
    pub cancelled: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/me/reservations", get(get_my_reservations))
        .route("/v1/reservations/{id}", get(get_reservation).delete(delete_reservation))
        .route("/v1/admin/reservations/restore", post(post_restore))
}

pub async fn user_reservations(
    state: &AppState,
    identity: &VerifiedIdentity,
    user_id: Option<&str>,
) -> Result<Vec<ReservationView>, AppError> {
    let user_id = user_id.unwrap_or(&identity.user_id);
    if !identity.may_act_for(user_id) {
        return Err(AppError::Authorization(format!("{} may not read reservations of {}", identity.user_id, user_id)));
    }
    Ok(state.desk.get_user_reservations(user_id).await?)
}

/// Unknown and already-cancelled reservations yield `false`.
pub async fn cancel_reservation(
    state: &AppState,
    identity: &VerifiedIdentity,
    reservation_id: Uuid,
) -> Result<bool, AppError> {
    let Some(view) = state.desk.get_reservation(reservation_id).await? else {
        return Ok(false);
    };
    if !identity.may_act_for(&view.reservation.user_id) {
        return Err(AppError::Authorization(format!(
            "{} may not cancel reservation {}",
            identity.user_id, reservation_id
        )));
    }
    Ok(state.desk.cancel_reservation(reservation_id).await?)
}

/// GET /v1/me/reservations
async fn get_my_reservations(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Vec<ReservationView>>, AppError> {
    Ok(Json(user_reservations(&state, &identity, None).await?))
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ReservationView>, AppError> {
    let view = state
        .desk
        .get_reservation(reservation_id)
        .await?
        .ok_or_else(|| EngineError::not_found(ResourceKind::Reservation, reservation_id))?;
    if !identity.may_act_for(&view.reservation.user_id) {
        return Err(AppError::Authorization(format!(
            "{} may not read reservation {}",
            identity.user_id, reservation_id
        )));
    }
    Ok(Json(view))
}

/// DELETE /v1/reservations/{id}
async fn delete_reservation(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = cancel_reservation(&state, &identity, reservation_id).await?;
    Ok(Json(CancelResponse {
        reservation_id,
        cancelled,
    }))
}

/// POST /v1/admin/reservations/restore
///
/// Re-imports a reservation exported before an outage. Operators only.
async fn post_restore(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(reservation): Json<Reservation>,
) -> Result<(StatusCode, Json<ReservationView>), AppError> {
    if identity.role != Role::Operator {
        return Err(AppError::Authorization("restoring reservations requires the operator role".to_string()));
    }
    let restored = state.holdings.restore_reservation(reservation).await?;
    Ok((StatusCode::CREATED, Json(ReservationView::from(restored))))
}
