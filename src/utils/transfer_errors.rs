// Transfer pipeline error taxonomy
// Every terminal item state must carry enough information to reconstruct
// what happened: an error message or a target reference, never silence.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Error, Debug)]
pub enum TransferError {
    /// No stored access or refresh token; the account needs a reconnect.
    /// Never retried automatically.
    #[error("Account credentials missing, reconnect required")]
    CredentialMissing,

    /// The provider rejected the refresh-token grant; reconnect required.
    #[error("Token refresh rejected by provider: {code}")]
    RefreshFailed { code: String },

    /// Slot or copy-count limit reached
    #[error("Quota exceeded: {used} of {allowed} used")]
    QuotaExceeded { allowed: i32, used: i32 },

    /// Too many copy attempts in the trailing window
    #[error("Rate limit exceeded. Try again in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Malformed identifier or argument; rejected before any state is created
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Network or protocol fault talking to a provider; fails the item,
    /// not the job
    #[error("Upstream provider unavailable: {message}")]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// User-initiated cancellation, distinct from failure
    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<diesel::result::Error> for TransferError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => TransferError::NotFound,
            _ => TransferError::Database(err.to_string()),
        }
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for TransferError {
    fn from(err: bb8::RunError<E>) -> Self {
        TransferError::Pool(err.to_string())
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

#[derive(Debug, Serialize)]
pub struct TransferErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TransferError {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransferError::CredentialMissing | TransferError::RefreshFailed { .. } => {
                StatusCode::UNAUTHORIZED
            },

            TransferError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,

            TransferError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            TransferError::InvalidArgument(_) => StatusCode::UNPROCESSABLE_ENTITY,

            TransferError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,

            TransferError::Cancelled => StatusCode::CONFLICT,

            TransferError::NotFound => StatusCode::NOT_FOUND,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API response
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::CredentialMissing => "CREDENTIAL_MISSING",
            TransferError::RefreshFailed { .. } => "REFRESH_FAILED",
            TransferError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            TransferError::RateLimited { .. } => "RATE_LIMITED",
            TransferError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TransferError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            TransferError::Cancelled => "CANCELLED",
            TransferError::NotFound => "NOT_FOUND",
            TransferError::Database(_) => "DATABASE_ERROR",
            TransferError::Pool(_) => "POOL_ERROR",
        }
    }

    /// Whether a reconnect (not a retry) is the remedy
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            TransferError::CredentialMissing | TransferError::RefreshFailed { .. }
        )
    }

    /// Create error response body
    pub fn to_response(&self) -> TransferErrorResponse {
        let details = match self {
            TransferError::QuotaExceeded { allowed, used } => {
                Some(serde_json::json!({ "allowed": allowed, "used": used }))
            },
            TransferError::RateLimited { retry_after } => {
                Some(serde_json::json!({ "retry_after": retry_after }))
            },
            TransferError::RefreshFailed { code } => {
                Some(serde_json::json!({ "provider_error": code }))
            },
            TransferError::UpstreamUnavailable { status, .. } => {
                status.map(|s| serde_json::json!({ "upstream_status": s }))
            },
            _ => None,
        };

        TransferErrorResponse {
            error: self.to_string(),
            code: self.error_code().to_string(),
            details,
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TransferError::QuotaExceeded {
                allowed: 2,
                used: 2
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            TransferError::RateLimited { retry_after: 10 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            TransferError::Cancelled.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_pool_error_conversion() {
        let err = TransferError::from(bb8::RunError::<std::io::Error>::TimedOut);
        assert!(matches!(err, TransferError::Pool(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_reconnect_classification() {
        assert!(TransferError::CredentialMissing.needs_reconnect());
        assert!(TransferError::RefreshFailed {
            code: "invalid_grant".to_string()
        }
        .needs_reconnect());
        assert!(!TransferError::RateLimited { retry_after: 5 }.needs_reconnect());
    }

    #[test]
    fn test_quota_details_in_response() {
        let response = TransferError::QuotaExceeded {
            allowed: 3,
            used: 3,
        }
        .to_response();
        assert_eq!(response.code, "QUOTA_EXCEEDED");
        let details = response.details.expect("quota errors carry counts");
        assert_eq!(details["allowed"], 3);
        assert_eq!(details["used"], 3);
    }
}
