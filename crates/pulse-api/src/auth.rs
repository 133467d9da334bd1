//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs signed with `JWT_SECRET`. Verification is local;
//! the user row is created lazily by `UserService::ensure`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use pulse_models::UserRole;

use crate::error::ApiError;
use crate::state::AppState;

/// Decoded token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub username: String,
    /// user | moderator | admin; anything else is treated as user
    #[serde(default)]
    pub role: String,
    /// Expiration (seconds since epoch)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            role: UserRole::from_str(&claims.role),
        }
    }
}

/// Verifies bearer tokens against the shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            ApiError::unauthorized(format!("Token validation failed: {}", e))
        })?;
        Ok(data.claims)
    }
}

/// Sign claims with the shared secret. Used by tooling and tests.
pub fn issue_token(secret: &str, claims: &Claims) -> Result<String, ApiError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Get Authorization header
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        // Extract Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = state.jwt.verify(token.trim())?;
        Ok(AuthUser::from(claims))
    }
}

/// An authenticated admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(ApiError::forbidden("Admin role required"));
        }
        Ok(AdminUser(user))
    }
}

/// An authenticated moderator or admin.
#[derive(Debug, Clone)]
pub struct ModeratorUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for ModeratorUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.can_moderate() {
            return Err(ApiError::forbidden("Moderator role required"));
        }
        Ok(ModeratorUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(exp_offset: i64, role: &str) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            username: "alice".into(),
            role: role.into(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iss: None,
        }
    }

    #[test]
    fn test_verify_roundtrip() {
        let original = claims(3600, "moderator");
        let token = issue_token(SECRET, &original).unwrap();
        let verified = JwtVerifier::new(SECRET, None).verify(&token).unwrap();
        assert_eq!(verified.sub, original.sub);

        let user = AuthUser::from(verified);
        assert_eq!(user.role, UserRole::Moderator);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = issue_token("other", &claims(3600, "user")).unwrap();
        assert!(JwtVerifier::new(SECRET, None).verify(&token).is_err());

        let expired = issue_token(SECRET, &claims(-3600, "user")).unwrap();
        assert!(JwtVerifier::new(SECRET, None).verify(&expired).is_err());
    }

    #[test]
    fn test_issuer_enforced() {
        let mut c = claims(3600, "user");
        c.iss = Some("someone-else".into());
        let token = issue_token(SECRET, &c).unwrap();
        assert!(JwtVerifier::new(SECRET, Some("pulse")).verify(&token).is_err());

        c.iss = Some("pulse".into());
        let token = issue_token(SECRET, &c).unwrap();
        assert!(JwtVerifier::new(SECRET, Some("pulse")).verify(&token).is_ok());
    }

    #[test]
    fn test_unknown_role_is_user() {
        let user = AuthUser::from(claims(60, "superuser"));
        assert_eq!(user.role, UserRole::User);
    }
}
