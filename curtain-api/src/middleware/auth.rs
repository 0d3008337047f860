use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

/// Verifies the bearer token and injects the caller's
/// [`VerifiedIdentity`](curtain_core::VerifiedIdentity) into request extensions.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Authentication("missing bearer token".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Authentication("expected a bearer token".to_string()))?;

    let identity = state.verifier.verify(token).await?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
