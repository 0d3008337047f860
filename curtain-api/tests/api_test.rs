use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use curtain_api::auth::issue_token;
use curtain_api::{app, AppState, AuthConfig, EngineParts};
use curtain_booking::{HoldPolicyKind, HoldRules};
use curtain_catalog::InMemoryCatalog;
use curtain_core::{ManualClock, Role};
use curtain_store::MemoryLedger;

const SECRET: &str = "test-secret";
const PERF: &str = "perf-kinky-1";
const SCHEDULE: &str = "perf-kinky-1-2026-02-10-19:30";

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

fn setup() -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()));
    let state = AppState::assemble(EngineParts {
        catalog: Arc::new(InMemoryCatalog::sample()),
        ledger: Arc::new(MemoryLedger::new()),
        clock: clock.clone(),
        sinks: Vec::new(),
        rules: HoldRules::default(),
        policy: HoldPolicyKind::SingleActive,
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
    })
    .unwrap();
    TestApp {
        router: app(state),
        clock,
    }
}

fn token(user_id: &str, role: Role) -> String {
    issue_token(SECRET, user_id, role, 3600).unwrap()
}

async fn send(router: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn hold_body(seats: &[&str]) -> Value {
    json!({
        "performanceId": PERF,
        "date": "2026-02-10",
        "time": "19:30",
        "seatIds": seats,
    })
}

#[tokio::test]
async fn test_guest_token_grants_access() {
    let app = setup();
    let (status, body) = send(&app.router, "POST", "/v1/auth/guest", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let guest_token = body["token"].as_str().unwrap().to_string();
    assert!(body["userId"].as_str().unwrap().starts_with("guest-"));

    let (status, body) = send(&app.router, "GET", "/v1/me/holdings", Some(&guest_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_mutating_routes_require_token() {
    let app = setup();
    let (status, body) = send(&app.router, "POST", "/v1/holdings", None, Some(hold_body(&["1층-B-1-6"]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = send(&app.router, "GET", "/v1/me/holdings", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_performances_and_schedules() {
    let app = setup();
    let (status, body) = send(&app.router, "GET", "/v1/performances", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["performanceId"], PERF);

    let (status, body) = send(&app.router, "GET", "/v1/performances/perf-kinky-1/schedules", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 6);
    assert_eq!(body["hasMore"], false);
    let first = &body["schedules"][0];
    assert_eq!(first["date"], "2026-02-10");
    assert_eq!(first["time"], "19:30");
    assert_eq!(first["totalSeats"], 587);
    assert_eq!(first["availableSeats"], 587);

    let (status, body) = send(&app.router, "GET", "/v1/performances/perf-nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PERFORMANCE_NOT_FOUND");
}

#[tokio::test]
async fn test_held_seats_reduce_live_counts() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let (status, _) = send(&app.router, "POST", "/v1/holdings", Some(&user), Some(hold_body(&["1층-B-1-6", "1층-B-1-7"]))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app.router, "GET", "/v1/performances/perf-kinky-1/schedules", None, None).await;
    assert_eq!(body["schedules"][0]["availableSeats"], 585);
    // Other slots are unaffected.
    assert_eq!(body["schedules"][1]["availableSeats"], 587);

    let uri = format!("/v1/performances/perf-kinky-1/seat-map?scheduleId={}", SCHEDULE);
    let (status, body) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["holding"], 2);
    assert_eq!(body["available"], 585);
}

#[tokio::test]
async fn test_hold_conflict_release_and_retry() {
    let app = setup();
    let owner = token("user-42", Role::Member);
    let other = token("user-7", Role::Member);

    let (status, holding) = send(&app.router, "POST", "/v1/holdings", Some(&owner), Some(hold_body(&["1층-B-1-6", "1층-B-1-7"]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(holding["userId"], "user-42");
    assert_eq!(holding["totalPrice"], 340_000);
    let holding_id = holding["holdingId"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, "POST", "/v1/holdings", Some(&other), Some(hold_body(&["1층-B-1-7", "1층-B-1-8"]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEATS_UNAVAILABLE");
    assert_eq!(body["unavailableSeats"], json!(["1층-B-1-7"]));

    // Only the owner may release.
    let uri = format!("/v1/holdings/{}", holding_id);
    let (status, _) = send(&app.router, "DELETE", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, "GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"][0]["displayNumber"], 18);
    assert_eq!(body["seats"][1]["displayNumber"], 19);

    let (status, body) = send(&app.router, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], true);

    let (_, body) = send(&app.router, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(body["released"], false);

    let (status, _) = send(&app.router, "POST", "/v1/holdings", Some(&other), Some(hold_body(&["1층-B-1-7", "1층-B-1-8"]))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_confirm_after_expiry_is_gone() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let (_, holding) = send(&app.router, "POST", "/v1/holdings", Some(&user), Some(hold_body(&["1층-B-2-3"]))).await;
    let holding_id = holding["holdingId"].as_str().unwrap().to_string();

    app.clock.advance(Duration::minutes(11));

    let uri = format!("/v1/holdings/{}/confirm", holding_id);
    let (status, body) = send(&app.router, "POST", &uri, Some(&user), Some(json!({}))).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "HOLDING_EXPIRED");
    assert!(body["expiredAt"].is_string());

    // The expired seat is free again for someone else.
    let other = token("user-7", Role::Member);
    let (status, _) = send(&app.router, "POST", "/v1/holdings", Some(&other), Some(hold_body(&["1층-B-2-3"]))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_confirm_list_and_cancel_reservation() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let other = token("user-7", Role::Member);

    let (_, holding) = send(&app.router, "POST", "/v1/holdings", Some(&user), Some(hold_body(&["1층-A-3-4", "1층-A-3-5"]))).await;
    let holding_id = holding["holdingId"].as_str().unwrap().to_string();

    let uri = format!("/v1/holdings/{}/confirm", holding_id);
    let (status, reservation) = send(&app.router, "POST", &uri, Some(&user), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "confirmed");
    assert_eq!(reservation["performanceTitle"], "킹키부츠");
    assert_eq!(reservation["venue"], "샤롯데씨어터");
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    // The holding is consumed.
    let (status, _) = send(&app.router, "GET", &format!("/v1/holdings/{}", holding_id), Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = send(&app.router, "GET", "/v1/me/reservations", Some(&user), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["displayStatus"], "confirmed");

    let cancel_uri = format!("/v1/reservations/{}", reservation_id);
    let (status, _) = send(&app.router, "DELETE", &cancel_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, "DELETE", &cancel_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    let (_, body) = send(&app.router, "DELETE", &cancel_uri, Some(&user), None).await;
    assert_eq!(body["cancelled"], false);

    let (_, body) = send(&app.router, "GET", &cancel_uri, Some(&user), None).await;
    assert_eq!(body["status"], "cancelled");

    // Seats are free again.
    let (status, _) = send(&app.router, "POST", "/v1/holdings", Some(&other), Some(hold_body(&["1층-A-3-4"]))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_available_seats_requires_party_size() {
    let app = setup();
    let uri = format!("/v1/performances/perf-kinky-1/seats?scheduleId={}", SCHEDULE);
    let (status, body) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_COUNT");

    let uri = format!("/v1/performances/perf-kinky-1/seats?scheduleId={}&partySize=2", SCHEDULE);
    let (status, body) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partySize"], 2);
    assert_eq!(body["totalAvailable"], 587);
}

#[tokio::test]
async fn test_tool_holds_display_seats() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let args = json!({
        "performanceId": PERF,
        "scheduleId": SCHEDULE,
        "displaySeats": [
            { "floor": "1층", "row": "1", "number": 18 },
            { "floor": "1층", "row": "1", "number": 19 }
        ]
    });

    let (status, body) = send(&app.router, "POST", "/v1/tools/hold_seats", Some(&user), Some(args)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let seats = body["result"]["seats"].as_array().unwrap();
    assert_eq!(seats[0]["seatId"], "1층-B-1-6");
    assert_eq!(seats[1]["seatId"], "1층-B-1-7");
    let holding_id = body["result"]["holdingId"].as_str().unwrap().to_string();

    let (_, body) = send(&app.router, "POST", "/v1/tools/cancel_hold", Some(&user), Some(json!({ "holdingId": holding_id }))).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["released"], true);
}

#[tokio::test]
async fn test_tool_explains_display_number_mistakes() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let args = json!({
        "performanceId": PERF,
        "scheduleId": SCHEDULE,
        "seatIds": ["1층-A-1-18"]
    });

    let (status, body) = send(&app.router, "POST", "/v1/tools/create_holding", Some(&user), Some(args)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNKNOWN_SEAT");
    assert_eq!(body["displayHint"], "1층-B-1-6");
}

#[tokio::test]
async fn test_unknown_tool_returns_error_object() {
    let app = setup();
    let user = token("user-42", Role::Member);
    let (status, body) = send(&app.router, "POST", "/v1/tools/book_everything", Some(&user), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNKNOWN_TOOL");
    assert!(body["availableTools"].as_array().unwrap().contains(&json!("hold_seats")));
}

#[tokio::test]
async fn test_tool_reservation_aliases() {
    let app = setup();
    let user = token("user-42", Role::Member);
    for name in ["get_my_reservations", "get_user_reservations"] {
        let (_, body) = send(&app.router, "POST", &format!("/v1/tools/{}", name), Some(&user), Some(json!({}))).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["count"], 0);
    }

    // Members cannot read someone else's reservations.
    let (_, body) = send(
        &app.router,
        "POST",
        "/v1/tools/get_user_reservations",
        Some(&user),
        Some(json!({ "userId": "user-7" })),
    )
    .await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_metrics_count_holds() {
    let app = setup();
    let user = token("user-42", Role::Member);
    send(&app.router, "POST", "/v1/holdings", Some(&user), Some(hold_body(&["2층-E-2-1"]))).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("curtain_holds_created_total 1"));
}
