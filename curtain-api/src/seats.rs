use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use curtain_catalog::VenueLayout;
use curtain_core::{DisplaySeatNumber, SeatStatus, StorageSeatId};
use curtain_seating::{RecommendRequest, SeatAvailability};

use crate::catalog::{performance, slot_for, SlotParams};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatQuery {
    pub schedule_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub grade: Option<String>,
    pub party_size: Option<u32>,
}

impl SeatQuery {
    fn slot_params(&self) -> SlotParams {
        SlotParams {
            schedule_id: self.schedule_id.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatState {
    pub seat_id: StorageSeatId,
    pub display_number: DisplaySeatNumber,
    pub status: SeatStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub available: usize,
    pub holding: usize,
    pub reserved: usize,
    pub seats: Vec<SeatState>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/performances/{id}/seats", get(get_available_seats))
        .route("/v1/performances/{id}/seat-map", get(get_seat_map))
}

pub async fn available_seats(state: &AppState, performance_id: &str, query: &SeatQuery) -> Result<SeatAvailability, AppError> {
    let performance = performance(state, performance_id).await?;
    let slot = slot_for(&performance, &query.slot_params())?;

    let request = RecommendRequest {
        slot,
        grade: query.grade.clone().filter(|g| !g.trim().is_empty()),
        party_size: query.party_size,
    };
    Ok(state.recommender.recommend(&request).await?)
}

/// GET /v1/performances/{id}/seats
async fn get_available_seats(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
    Query(query): Query<SeatQuery>,
) -> Result<Json<SeatAvailability>, AppError> {
    Ok(Json(available_seats(&state, &performance_id, &query).await?))
}

/// GET /v1/performances/{id}/seat-map
async fn get_seat_map(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
    Query(params): Query<SlotParams>,
) -> Result<Json<SeatMap>, AppError> {
    let performance = performance(&state, &performance_id).await?;
    let slot = slot_for(&performance, &params)?;
    let map = state.projector.status_map_for(&performance, &slot).await?;
    let layout = VenueLayout::new(&performance.sections);

    let count = |wanted: SeatStatus| map.values().filter(|s| **s == wanted).count();
    let seats = map
        .iter()
        .map(|(seat_id, status)| SeatState {
            display_number: layout.display_number(seat_id),
            seat_id: seat_id.clone(),
            status: *status,
        })
        .collect();

    Ok(Json(SeatMap {
        performance_id: slot.performance_id.clone(),
        date: slot.date_string(),
        time: slot.time.clone(),
        available: count(SeatStatus::Available),
        holding: count(SeatStatus::Holding),
        reserved: count(SeatStatus::Reserved),
        seats,
    }))
}
