//! Tool-call boundary for the booking assistant.
//!
//! Every tool answers `200` with either `{"success": true, "result": ...}` or
//! `{"success": false, "error": ..., "code": ...}` so the caller can relay
//! failures to the user instead of aborting the conversation.

use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use curtain_catalog::ScheduleQuery;
use curtain_core::VerifiedIdentity;

use crate::catalog::{performance, performance_summaries, schedules, seat_grades};
use crate::holdings::{self, ConfirmHoldingRequest, CreateHoldingRequest};
use crate::reservations;
use crate::seats::{available_seats, SeatQuery};
use crate::{error::AppError, state::AppState};

pub const TOOL_NAMES: &[&str] = &[
    "list_performances",
    "get_performance",
    "get_schedules",
    "get_seat_grades",
    "get_available_seats",
    "hold_seats",
    "create_holding",
    "get_holding",
    "cancel_hold",
    "release_holding",
    "confirm_holding",
    "get_my_reservations",
    "get_user_reservations",
    "cancel_reservation",
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/tools/{name}", post(call_tool))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceArgs {
    performance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    performance_id: String,
    from_date: Option<NaiveDate>,
    #[serde(default)]
    prefer_weekend: bool,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeArgs {
    performance_id: String,
    schedule_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeatArgs {
    performance_id: String,
    schedule_id: Option<String>,
    date: Option<String>,
    time: Option<String>,
    grade: Option<String>,
    party_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingArgs {
    holding_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmArgs {
    holding_id: Uuid,
    performance_title: Option<String>,
    venue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationListArgs {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelReservationArgs {
    reservation_id: Uuid,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, AppError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| AppError::BadRequest(format!("invalid arguments: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

/// Runs one tool by name.
pub async fn dispatch(state: &AppState, identity: &VerifiedIdentity, name: &str, args: Value) -> Result<Value, AppError> {
    match name {
        "list_performances" => {
            let performances = performance_summaries(state).await?;
            Ok(json!({ "count": performances.len(), "performances": performances }))
        }
        "get_performance" => {
            let args: PerformanceArgs = parse_args(args)?;
            to_json(&performance(state, &args.performance_id).await?)
        }
        "get_schedules" => {
            let args: ScheduleArgs = parse_args(args)?;
            let query = ScheduleQuery {
                from_date: args.from_date,
                prefer_weekend: args.prefer_weekend,
                limit: args.limit,
            };
            to_json(&schedules(state, &args.performance_id, &query).await?)
        }
        "get_seat_grades" => {
            let args: GradeArgs = parse_args(args)?;
            to_json(&seat_grades(state, &args.performance_id, args.schedule_id.as_deref()).await?)
        }
        "get_available_seats" => {
            let args: SeatArgs = parse_args(args)?;
            let query = SeatQuery {
                schedule_id: args.schedule_id,
                date: args.date,
                time: args.time,
                grade: args.grade,
                party_size: args.party_size,
            };
            to_json(&available_seats(state, &args.performance_id, &query).await?)
        }
        "hold_seats" | "create_holding" => {
            let req: CreateHoldingRequest = parse_args(args)?;
            let holding = holdings::create_holding(state, identity, &req).await?;
            match state.holdings.holding_detail(holding.holding_id).await? {
                Some(detail) => to_json(&detail),
                None => to_json(&holding),
            }
        }
        "get_holding" => {
            let args: HoldingArgs = parse_args(args)?;
            to_json(&holdings::holding_detail(state, identity, args.holding_id).await?)
        }
        "cancel_hold" | "release_holding" => {
            let args: HoldingArgs = parse_args(args)?;
            let released = holdings::release_holding(state, identity, args.holding_id).await?;
            Ok(json!({ "holdingId": args.holding_id, "released": released }))
        }
        "confirm_holding" => {
            let args: ConfirmArgs = parse_args(args)?;
            let req = ConfirmHoldingRequest {
                performance_title: args.performance_title,
                venue: args.venue,
            };
            to_json(&holdings::confirm_holding(state, identity, args.holding_id, &req).await?)
        }
        "get_my_reservations" | "get_user_reservations" => {
            let args: ReservationListArgs = parse_args(args)?;
            let list = reservations::user_reservations(state, identity, args.user_id.as_deref()).await?;
            Ok(json!({ "count": list.len(), "reservations": list }))
        }
        "cancel_reservation" => {
            let args: CancelReservationArgs = parse_args(args)?;
            let cancelled = reservations::cancel_reservation(state, identity, args.reservation_id).await?;
            Ok(json!({ "reservationId": args.reservation_id, "cancelled": cancelled }))
        }
        other => Err(AppError::UnknownTool(other.to_string())),
    }
}

/// POST /v1/tools/{name}
async fn call_tool(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Json<Value> {
    match dispatch(&state, &identity, &name, args).await {
        Ok(result) => Json(json!({ "success": true, "result": result })),
        Err(err) => {
            tracing::warn!(tool = %name, code = err.code(), "tool call failed: {}", err);
            let mut body = err.body();
            body["success"] = json!(false);
            if matches!(err, AppError::UnknownTool(_)) {
                body["availableTools"] = json!(TOOL_NAMES);
            }
            Json(body)
        }
    }
}
