use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use curtain_catalog::{
    grade_rank, list_schedules, normalize_grade, resolve_schedule, Performance, PerformanceSummary,
    ScheduleListing, ScheduleQuery, Venue, VenueLayout, APRON_GRADE,
};
use curtain_core::{EngineError, ResourceKind, SeatStatus, SlotKey, ValidationError};
use curtain_seating::format_won;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Names a slot either by schedule id or by date and time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotParams {
    pub schedule_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub grade: String,
    pub price: i64,
    pub formatted_price: String,
    pub color: String,
    pub description: Option<String>,
    /// Free seats of this grade when a schedule was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_seats: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatGradeList {
    pub performance_id: String,
    pub title: String,
    pub grades: Vec<GradeEntry>,
    #[serde(rename = "hasOPSeats")]
    pub has_op_seats: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/performances", get(get_performances))
        .route("/v1/performances/{id}", get(get_performance))
        .route("/v1/performances/{id}/schedules", get(get_schedules))
        .route("/v1/performances/{id}/grades", get(get_grades))
        .route("/v1/venues/{id}", get(get_venue))
}

// ============================================================================
// Shared lookups
// ============================================================================

pub async fn performance(state: &AppState, performance_id: &str) -> Result<Performance, AppError> {
    state
        .catalog
        .get_performance(performance_id)
        .await
        .map_err(EngineError::from)?
        .ok_or_else(|| EngineError::not_found(ResourceKind::Performance, performance_id).into())
}

/// Resolves a slot of `performance` from a schedule id, or failing that
/// from explicit date and time.
pub fn slot_for(performance: &Performance, params: &SlotParams) -> Result<SlotKey, AppError> {
    if let Some(schedule_id) = params.schedule_id.as_deref().filter(|s| !s.is_empty()) {
        let (date, time) = resolve_schedule(performance, schedule_id)
            .ok_or_else(|| EngineError::not_found(ResourceKind::Schedule, schedule_id))?;
        return Ok(SlotKey {
            performance_id: performance.performance_id.clone(),
            date,
            time,
        });
    }

    match (params.date.as_deref(), params.time.as_deref()) {
        (Some(date), Some(time)) => Ok(SlotKey::new(&performance.performance_id, date, time)?),
        _ => Err(ValidationError::MissingField("scheduleId").into()),
    }
}

pub async fn performance_summaries(state: &AppState) -> Result<Vec<PerformanceSummary>, AppError> {
    Ok(state.catalog.list_performances().await.map_err(EngineError::from)?)
}

/// Upcoming slots with live seat counts.
pub async fn schedules(state: &AppState, performance_id: &str, query: &ScheduleQuery) -> Result<ScheduleListing, AppError> {
    let performance = performance(state, performance_id).await?;
    let today = state.clock.now().date_naive();
    let mut listing = list_schedules(&performance, query, today);

    for slot in &mut listing.schedules {
        let key = SlotKey {
            performance_id: performance.performance_id.clone(),
            date: slot.date,
            time: slot.time.clone(),
        };
        let map = state.projector.status_map_for(&performance, &key).await?;
        let available = map.values().filter(|s| **s == SeatStatus::Available).count();
        slot.total_seats = Some(map.len() as u32);
        slot.available_seats = Some(available as u32);
        if available == 0 && !map.is_empty() {
            slot.status = "SOLD_OUT".to_string();
        }
    }
    Ok(listing)
}

/// Price table of a performance, with free seats per grade for one slot.
pub async fn seat_grades(state: &AppState, performance_id: &str, schedule_id: Option<&str>) -> Result<SeatGradeList, AppError> {
    let performance = performance(state, performance_id).await?;

    let free_by_grade = match schedule_id {
        Some(schedule_id) => {
            let params = SlotParams {
                schedule_id: Some(schedule_id.to_string()),
                ..SlotParams::default()
            };
            let slot = slot_for(&performance, &params)?;
            let map = state.projector.status_map_for(&performance, &slot).await?;
            let layout = VenueLayout::new(&performance.sections);

            let mut counts: HashMap<String, usize> = HashMap::new();
            for seat in map.iter().filter(|(_, s)| **s == SeatStatus::Available).map(|(id, _)| id) {
                if let Ok(grade) = layout.resolve_grade(seat) {
                    *counts.entry(normalize_grade(grade)).or_default() += 1;
                }
            }
            Some(counts)
        }
        None => None,
    };

    let mut grades: Vec<GradeEntry> = performance
        .seat_grades
        .iter()
        .filter(|g| performance.has_op_seats || normalize_grade(&g.grade) != APRON_GRADE)
        .map(|g| GradeEntry {
            grade: g.grade.clone(),
            price: g.price,
            formatted_price: format_won(g.price),
            color: g.color.clone(),
            description: g.description.clone(),
            available_seats: free_by_grade
                .as_ref()
                .map(|counts| counts.get(&normalize_grade(&g.grade)).copied().unwrap_or(0)),
        })
        .collect();
    grades.sort_by_key(|g| grade_rank(&normalize_grade(&g.grade)));

    Ok(SeatGradeList {
        performance_id: performance.performance_id.clone(),
        title: performance.title.clone(),
        grades,
        has_op_seats: performance.has_op_seats,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/performances
async fn get_performances(State(state): State<AppState>) -> Result<Json<Vec<PerformanceSummary>>, AppError> {
    Ok(Json(performance_summaries(&state).await?))
}

/// GET /v1/performances/{id}
async fn get_performance(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
) -> Result<Json<Performance>, AppError> {
    Ok(Json(performance(&state, &performance_id).await?))
}

/// GET /v1/performances/{id}/schedules
async fn get_schedules(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleListing>, AppError> {
    Ok(Json(schedules(&state, &performance_id, &query).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeParams {
    schedule_id: Option<String>,
}

/// GET /v1/performances/{id}/grades
async fn get_grades(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
    Query(params): Query<GradeParams>,
) -> Result<Json<SeatGradeList>, AppError> {
    Ok(Json(
        seat_grades(&state, &performance_id, params.schedule_id.as_deref()).await?,
    ))
}

/// GET /v1/venues/{id}
async fn get_venue(State(state): State<AppState>, Path(venue_id): Path<String>) -> Result<Json<Venue>, AppError> {
    let venue = state
        .catalog
        .get_venue(&venue_id)
        .await
        .map_err(EngineError::from)?
        .ok_or_else(|| EngineError::not_found(ResourceKind::Venue, &venue_id))?;
    Ok(Json(venue))
}
