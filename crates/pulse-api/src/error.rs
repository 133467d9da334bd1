//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use pulse_db::DbError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::InsufficientFunds { .. } => "insufficient_funds",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited => "rate_limited",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => ApiError::NotFound(what),
            DbError::Conflict(msg) | DbError::InvalidState(msg) => ApiError::Conflict(msg),
            DbError::InsufficientFunds { needed, available } => {
                ApiError::InsufficientFunds { needed, available }
            }
            DbError::Forbidden(msg) => ApiError::Forbidden(msg),
            DbError::Invalid(msg) => ApiError::BadRequest(msg),
            DbError::RetryLimitExceeded { attempts } => {
                ApiError::Unavailable(format!("database busy after {} attempts", attempts))
            }
            other if other.is_unique_violation() => ApiError::Conflict("resource already exists".to_string()),
            other => {
                error!(error = %other, "Database error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let codes: Vec<String> = errs.iter().map(|e| e.code.to_string()).collect();
                format!("{}: {}", field, codes.join(", "))
            })
            .collect();
        fields.sort();
        ApiError::Validation(fields.join("; "))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse { detail, code: self.code() };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::RateLimited | ApiError::Unavailable(_)) {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_mapping() {
        let cases = [
            (DbError::not_found("wallet"), StatusCode::NOT_FOUND),
            (DbError::conflict("dup"), StatusCode::CONFLICT),
            (DbError::InvalidState("withdrawal is completed".into()), StatusCode::CONFLICT),
            (
                DbError::InsufficientFunds { needed: 10, available: 3 },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (DbError::forbidden("not yours"), StatusCode::FORBIDDEN),
            (DbError::invalid("self transfer"), StatusCode::BAD_REQUEST),
            (DbError::RetryLimitExceeded { attempts: 4 }, StatusCode::SERVICE_UNAVAILABLE),
            (DbError::Pool("closed".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (db, status) in cases {
            assert_eq!(ApiError::from(db).status_code(), status);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::RateLimited.code(), "rate_limited");
        assert_eq!(
            ApiError::InsufficientFunds { needed: 1, available: 0 }.code(),
            "insufficient_funds"
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "1");
    }
}
