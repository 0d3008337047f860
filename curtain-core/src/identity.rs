use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Member,
    Operator,
}

/// Caller identity established by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub role: Role,
}

impl VerifiedIdentity {
    /// Operators may act on any user's holdings and reservations.
    pub fn may_act_for(&self, user_id: &str) -> bool {
        self.role == Role::Operator || self.user_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Fixed token table. Used by tests and local demos.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, user_id: &str, role: Role) -> Self {
        self.tokens.insert(
            token.to_string(),
            VerifiedIdentity {
                user_id: user_id.to_string(),
                role,
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::Missing);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Invalid("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticTokenVerifier::new().with_token("t-1", "user-42", Role::Member);

        let identity = verifier.verify("t-1").await.unwrap();
        assert_eq!(identity.user_id, "user-42");
        assert!(identity.may_act_for("user-42"));
        assert!(!identity.may_act_for("user-7"));

        assert_eq!(verifier.verify("").await.unwrap_err(), IdentityError::Missing);
        assert!(verifier.verify("nope").await.is_err());
    }

    #[test]
    fn test_operator_acts_for_anyone() {
        let op = VerifiedIdentity { user_id: "ops".into(), role: Role::Operator };
        assert!(op.may_act_for("user-42"));
    }
}
