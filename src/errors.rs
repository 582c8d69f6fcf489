use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::RejectReason;

/// JSON body returned for any non-ok outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable description
    pub message: String,
    /// Enumerated rejection reason, when the outcome is a business rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Error taxonomy for the ledger core.
///
/// `NotFound` and `Rejected` are expected business outcomes and propagate
/// unchanged; `TransientFailure` means the retry bound was exhausted on a
/// store conflict; everything else is an internal failure with the whole
/// atomic unit rolled back.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transaction rejected: {0}")]
    Rejected(RejectReason),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("Transient failure: {0}")]
    TransientFailure(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Wraps a raw database error.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// The status the out-of-scope HTTP layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::Rejected(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::TransientFailure(_) | ServiceError::ConcurrentModification(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::DatabaseError(_)
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> Option<RejectReason> {
        match self {
            ServiceError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not the response body.
        let message = match &self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                tracing::error!(error = %self, "internal failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message,
            reason: self.reason(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
