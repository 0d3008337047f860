use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use curtain_core::{EngineError, IdentityError, ValidationError};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Engine(err.into())
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::Authentication(err.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) => match e {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::Conflict { .. } => StatusCode::CONFLICT,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::Expired { .. } => StatusCode::GONE,
                EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownTool(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Engine(e) => e.code(),
            AppError::Authentication(_) => "UNAUTHENTICATED",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::UnknownTool(_) => "UNKNOWN_TOOL",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// JSON error object shared by HTTP responses and tool results.
    pub fn body(&self) -> Value {
        let message = match self {
            AppError::Engine(EngineError::Storage(e)) => {
                tracing::error!("Storage failure: {}", e);
                "Internal Server Error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": message,
            "code": self.code(),
        });
        match self {
            AppError::Engine(EngineError::Conflict { unavailable }) => {
                body["unavailableSeats"] = json!(unavailable);
            }
            AppError::Engine(EngineError::Validation(ValidationError::UnknownSeat {
                display_hint: Some(hint),
                ..
            })) => {
                body["displayHint"] = json!(hint);
            }
            AppError::Engine(EngineError::Expired { expired_at, .. }) => {
                body["expiredAt"] = json!(expired_at);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::ResourceKind;

    #[test]
    fn test_status_mapping() {
        let conflict = AppError::from(EngineError::Conflict {
            unavailable: vec!["1층-B-1-6".parse().unwrap()],
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.body()["unavailableSeats"][0], "1층-B-1-6");

        let missing = AppError::from(EngineError::not_found(ResourceKind::Holding, "h-1"));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.body()["code"], "HOLDING_NOT_FOUND");

        let party = AppError::from(ValidationError::MissingPartySize);
        assert_eq!(party.status(), StatusCode::BAD_REQUEST);
        assert_eq!(party.body()["code"], "MISSING_COUNT");
    }

    #[test]
    fn test_unknown_seat_carries_display_hint() {
        let err = AppError::from(ValidationError::UnknownSeat {
            seat_id: "1층-A-1-18".to_string(),
            display_hint: Some("1층-B-1-6".to_string()),
        });
        let body = err.body();
        assert_eq!(body["code"], "UNKNOWN_SEAT");
        assert_eq!(body["displayHint"], "1층-B-1-6");
    }

    #[test]
    fn test_storage_details_stay_internal() {
        let err = AppError::from(EngineError::Storage(curtain_core::StoreError::Backend(
            "connection refused".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body()["error"], "Internal Server Error");
    }
}
