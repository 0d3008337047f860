use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use curtain_booking::{parse_seat_ids, HoldingDetail, ReservationView};
use curtain_catalog::VenueLayout;
use curtain_core::{
    DisplaySeat, EngineError, Holding, ResourceKind, StorageSeatId, ValidationError, VerifiedIdentity,
};

use crate::catalog::{performance, slot_for, SlotParams};
use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHoldingRequest {
    pub performance_id: String,
    pub schedule_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Storage ids such as `1층-B-1-6`, passed through unchanged.
    #[serde(default)]
    pub seat_ids: Vec<String>,
    /// Seats named by their printed (theater-wide) numbers.
    #[serde(default)]
    pub display_seats: Vec<DisplaySeat>,
    /// Defaults to the caller. Only operators may hold for someone else.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmHoldingRequest {
    pub performance_title: Option<String>,
    pub venue: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub holding_id: Uuid,
    pub released: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/holdings", post(post_holding))
        .route("/v1/holdings/{id}", get(get_holding).delete(delete_holding))
        .route("/v1/holdings/{id}/confirm", post(post_confirm))
        .route("/v1/me/holdings", get(get_my_holdings))
}

// ============================================================================
// Operations
// ============================================================================

fn ensure_may_act(identity: &VerifiedIdentity, owner: &str) -> Result<(), AppError> {
    if identity.may_act_for(owner) {
        Ok(())
    } else {
        Err(AppError::Authorization(format!(
            "{} may not act for {}",
            identity.user_id, owner
        )))
    }
}

/// Converts printed seat numbers to storage ids through the venue layout.
fn convert_display_seats(layout: &VenueLayout<'_>, seats: &[DisplaySeat]) -> Result<Vec<StorageSeatId>, ValidationError> {
    seats
        .iter()
        .map(|seat| {
            layout.global_to_local(seat).ok_or_else(|| ValidationError::UnknownSeat {
                seat_id: match &seat.section {
                    Some(section) => format!("{} {}구역 {}열 {}번", seat.floor, section, seat.row, seat.number),
                    None => format!("{} {}열 {}번", seat.floor, seat.row, seat.number),
                },
                display_hint: None,
            })
        })
        .collect()
}

pub async fn create_holding(
    state: &AppState,
    identity: &VerifiedIdentity,
    req: &CreateHoldingRequest,
) -> Result<Holding, AppError> {
    let user_id = req.user_id.clone().unwrap_or_else(|| identity.user_id.clone());
    ensure_may_act(identity, &user_id)?;

    let performance = performance(state, &req.performance_id).await?;
    let slot = slot_for(
        &performance,
        &SlotParams {
            schedule_id: req.schedule_id.clone(),
            date: req.date.clone(),
            time: req.time.clone(),
        },
    )?;

    let mut seats = parse_seat_ids(&req.seat_ids)?;
    if !req.display_seats.is_empty() {
        let layout = VenueLayout::new(&performance.sections);
        seats.extend(convert_display_seats(&layout, &req.display_seats)?);
    }

    match state.holdings.create_holding(&slot, &seats, &user_id).await {
        Ok(holding) => Ok(holding),
        Err(e) => {
            if matches!(e, EngineError::Conflict { .. }) {
                state.metrics.hold_conflicts.inc();
            }
            Err(e.into())
        }
    }
}

pub async fn holding_detail(
    state: &AppState,
    identity: &VerifiedIdentity,
    holding_id: Uuid,
) -> Result<HoldingDetail, AppError> {
    let detail = state
        .holdings
        .holding_detail(holding_id)
        .await?
        .ok_or_else(|| EngineError::not_found(ResourceKind::Holding, holding_id))?;
    ensure_may_act(identity, &detail.user_id)?;
    Ok(detail)
}

/// `false` for unknown, expired and already released holdings.
pub async fn release_holding(state: &AppState, identity: &VerifiedIdentity, holding_id: Uuid) -> Result<bool, AppError> {
    match state.holdings.get_holding(holding_id).await? {
        Some(holding) => ensure_may_act(identity, &holding.user_id)?,
        None => return Ok(false),
    }
    Ok(state.holdings.release_holding(holding_id).await?)
}

pub async fn confirm_holding(
    state: &AppState,
    identity: &VerifiedIdentity,
    holding_id: Uuid,
    req: &ConfirmHoldingRequest,
) -> Result<ReservationView, AppError> {
    // Expired holdings still have to reach the manager to fail as expired.
    if let Some(holding) = state.holdings.get_holding(holding_id).await? {
        ensure_may_act(identity, &holding.user_id)?;
    }
    let reservation = state
        .holdings
        .confirm_holding(holding_id, req.performance_title.as_deref(), req.venue.as_deref())
        .await?;
    Ok(ReservationView::from(reservation))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/holdings
async fn post_holding(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(req): Json<CreateHoldingRequest>,
) -> Result<(StatusCode, Json<Holding>), AppError> {
    let holding = create_holding(&state, &identity, &req).await?;
    Ok((StatusCode::CREATED, Json(holding)))
}

/// GET /v1/holdings/{id}
async fn get_holding(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(holding_id): Path<Uuid>,
) -> Result<Json<HoldingDetail>, AppError> {
    Ok(Json(holding_detail(&state, &identity, holding_id).await?))
}

/// DELETE /v1/holdings/{id}
async fn delete_holding(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(holding_id): Path<Uuid>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = release_holding(&state, &identity, holding_id).await?;
    Ok(Json(ReleaseResponse { holding_id, released }))
}

/// POST /v1/holdings/{id}/confirm
async fn post_confirm(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(holding_id): Path<Uuid>,
    Json(req): Json<ConfirmHoldingRequest>,
) -> Result<(StatusCode, Json<ReservationView>), AppError> {
    let view = confirm_holding(&state, &identity, holding_id, &req).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /v1/me/holdings
async fn get_my_holdings(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Vec<Holding>>, AppError> {
    Ok(Json(state.holdings.holdings_for_user(&identity.user_id).await?))
}
