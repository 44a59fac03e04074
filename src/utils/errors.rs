/*!
 * Error Handling
 *
 * Defines application-wide error types and conversion implementations
 * for proper error handling and HTTP response mapping.
 *
 * Two layers:
 * - `AppError` maps failures to HTTP responses on the admin API.
 * - `DispatchError` is the engine-side failure taxonomy; it decides
 *   whether a fired job retries, fails, or completes as just-logged.
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Application result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types (HTTP surface)
#[derive(Debug)]
pub enum AppError {
    /// Database error
    Database(sqlx::Error),
    /// Not found error
    NotFound(String),
    /// Validation error (includes invalid status transitions)
    Validation(String),
    /// Conflict error (e.g., duplicate resource)
    Conflict(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(err) => write!(f, "Database error: {}", err),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::Internal(msg) => write!(f, "Internal server error: {}", msg),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Convert SQLx errors to AppError
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::Database(err)
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidTransition(msg) => Self::Validation(msg),
            DispatchError::NotFound(msg) => Self::NotFound(msg),
            DispatchError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::Database(ref err) => {
                // Don't expose internal database errors to clients
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        };

        let body = Json(json!({
            "error": error_code,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

/// Engine-side failure taxonomy for the dispatch path.
///
/// The classification drives what happens to a fired job: transient
/// failures re-fire with back-off, everything else resolves the job
/// immediately (FAILED, or SENT-with-detail for missing recipients).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing template version or malformed configuration; fatal for the job
    #[error("configuration error: {0}")]
    Config(String),

    /// Recipient absent; job completes as just-logged
    #[error("not found: {0}")]
    NotFound(String),

    /// Status-update call with an unreachable target status
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// 5xx / timeout / connection failure; retried with back-off
    #[error("transient transport failure: {0}")]
    TransportTransient(String),

    /// 4xx from the transport; goes straight to FAILED
    #[error("permanent transport failure: {0}")]
    TransportPermanent(String),

    /// Broadcast topic failure; swallowed by the publisher, logged
    #[error("broadcast failure: {0}")]
    Broadcast(String),

    /// Template rendering failure; non-retryable
    #[error("template render failure: {0}")]
    Render(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl DispatchError {
    /// Whether the fired job should re-fire with back-off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportTransient(_) | Self::Database(_) | Self::Broadcast(_)
        )
    }

    /// Classify a reqwest error per the transport failure taxonomy:
    /// timeouts and connection errors are transient, 5xx transient,
    /// other statuses permanent.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::TransportTransient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => {
                Self::TransportTransient(err.to_string())
            }
            Some(_) => Self::TransportPermanent(err.to_string()),
            None => Self::TransportTransient(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("History record not found".to_string());
        assert_eq!(err.to_string(), "Not found: History record not found");

        let err = AppError::Validation("bad transition".to_string());
        assert_eq!(err.to_string(), "Validation error: bad transition");
    }

    #[test]
    fn test_app_error_from_sqlx() {
        let sqlx_err = sqlx::Error::RowNotFound;
        let app_err: AppError = sqlx_err.into();
        match app_err {
            AppError::Database(_) => (),
            _ => panic!("Expected Database error"),
        }
    }

    #[test]
    fn test_invalid_transition_maps_to_validation() {
        let err: AppError =
            DispatchError::InvalidTransition("SENT -> SCHEDULED".to_string()).into();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("SENT")),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::TransportTransient("503".to_string()).is_retryable());
        assert!(DispatchError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!DispatchError::TransportPermanent("400".to_string()).is_retryable());
        assert!(!DispatchError::Config("no version".to_string()).is_retryable());
        assert!(!DispatchError::Render("missing variable".to_string()).is_retryable());
    }
}
