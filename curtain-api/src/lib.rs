use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod catalog;
pub mod error;
pub mod holdings;
pub mod metrics;
pub mod middleware;
pub mod reservations;
pub mod seats;
pub mod state;
pub mod stream;
pub mod tools;
pub mod worker;

pub use state::{AppState, AuthConfig, EngineParts};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Holding, reservation and tool routes act on behalf of a user.
    let protected = Router::new()
        .merge(holdings::routes())
        .merge(reservations::routes())
        .merge(tools::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_identity,
        ));

    Router::new()
        .merge(auth::routes())
        .merge(catalog::routes())
        .merge(seats::routes())
        .merge(stream::routes())
        .merge(metrics::routes())
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
