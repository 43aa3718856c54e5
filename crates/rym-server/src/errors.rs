//! HTTP-facing error type.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rym_ledger::LedgerError;
use rym_store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Body text for a missing player.
pub const USER_NOT_FOUND: &str = "User not found";

/// Errors returned by REST handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("forbidden")]
    Forbidden,

    /// Malformed or semantically invalid request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Vote rejected for lack of credits.
    #[error("insufficient credits: {credits}")]
    InsufficientCredits {
        /// Balance at the time of the attempt.
        credits: u32,
    },

    /// Storage stayed busy through every retry. Safe to retry later.
    #[error("storage busy")]
    Busy,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Busy => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ResourceBusy { .. } => Self::Busy,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits { balance, .. } => {
                Self::InsufficientCredits { credits: balance }
            }
            LedgerError::UserNotFound(id) => {
                debug!(user_id = %id, "no credit record");
                Self::NotFound(USER_NOT_FOUND.into())
            }
            LedgerError::Storage(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthorized(msg) => {
                warn!(reason = %msg, "request unauthorized");
                json!({ "error": "unauthorized" })
            }
            Self::Forbidden => json!({ "error": "Admin access required" }),
            Self::BadRequest(msg) | Self::NotFound(msg) => json!({ "error": msg }),
            Self::InsufficientCredits { credits } => {
                json!({ "error": "Insufficient credits", "credits": credits })
            }
            Self::Busy => {
                warn!("request failed, storage busy");
                json!({ "error": "Server busy, please retry" })
            }
            Self::Internal(msg) => {
                error!(error = %msg, "request failed");
                json!({ "error": "Internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
