use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use curtain_core::{IdentityError, Role, TokenVerifier, VerifiedIdentity};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id the token acts for.
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

pub fn issue_token(secret: &str, user_id: &str, role: Role, ttl_seconds: u64) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_owned(),
        role,
        exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}

/// HS256 verifier over the configured shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::Missing);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => IdentityError::Expired,
            _ => IdentityError::Invalid(e.to_string()),
        })?;

        Ok(VerifiedIdentity {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

// ============================================================================
// Guest tokens
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    user_id: String,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let user_id = format!("guest-{}", Uuid::new_v4());
    let token = issue_token(&state.auth.secret, &user_id, Role::Guest, state.auth.expiration)?;

    Ok(Json(AuthResponse {
        token,
        user_id,
        expires_in: state.auth.expiration,
    }))
}
