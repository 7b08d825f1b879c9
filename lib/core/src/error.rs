use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these —
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "NOT_FOUND", "message": "..."}`.
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const CONFIRMATION_REQUIRED: &str = "CONFIRMATION_REQUIRED";
    pub const MACHINE_UNAVAILABLE: &str = "MACHINE_UNAVAILABLE";
    pub const VERSION_CONFLICT: &str = "VERSION_CONFLICT";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type used across all modules.
///
/// Each variant maps to a stable error code (see [`error_code`]) and an
/// HTTP status code. The JSON response always includes both, plus any
/// structured detail the variant carries:
///
/// ```json
/// {"code": "INVALID_STATE", "message": "...", "required": "folded", "actual": "folding"}
/// ```
///
/// Workflow errors are always returned as typed results to the caller so a
/// UI can render an actionable message (e.g. "ask a coworker to verify") —
/// never thrown across the transport boundary as generic failures.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Resource does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate assignment / already-done checkpoint. HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// Input data is invalid. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// A checkpoint action was attempted in the wrong predecessor status.
    /// Carries the required and actual status so the caller can explain it
    /// to the operator. HTTP 409.
    #[error("order must be '{required}' for this action (currently '{actual}')")]
    InvalidStateTransition { required: String, actual: String },

    /// Dual-control violation: the verifier is the person who performed the
    /// step. Recoverable — re-invoke with `forceSamePerson: true` to confirm
    /// the override (permanently tagged in the audit trail). HTTP 409.
    #[error("{action} requires a second person (performed by {performer}); pass forceSamePerson to override")]
    ConfirmationRequired { action: String, performer: String },

    /// Machine cannot be scanned into an assignment (maintenance). HTTP 409.
    #[error("{0}")]
    MachineUnavailable(String),

    /// Optimistic-concurrency version mismatch. The workflow retries this
    /// internally a bounded number of times before surfacing it. HTTP 409.
    #[error("{0}")]
    PersistenceConflict(String),

    /// Storage backend failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::CONFLICT,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::InvalidStateTransition { .. } => error_code::INVALID_STATE,
            ServiceError::ConfirmationRequired { .. } => error_code::CONFIRMATION_REQUIRED,
            ServiceError::MachineUnavailable(_) => error_code::MACHINE_UNAVAILABLE,
            ServiceError::PersistenceConflict(_) => error_code::VERSION_CONFLICT,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            ServiceError::ConfirmationRequired { .. } => StatusCode::CONFLICT,
            ServiceError::MachineUnavailable(_) => StatusCode::CONFLICT,
            ServiceError::PersistenceConflict(_) => StatusCode::CONFLICT,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        // Structured detail for the variants that carry it.
        match &self {
            ServiceError::InvalidStateTransition { required, actual } => {
                body["required"] = serde_json::json!(required);
                body["actual"] = serde_json::json!(actual);
            }
            ServiceError::ConfirmationRequired { action, performer } => {
                body["action"] = serde_json::json!(action);
                body["performer"] = serde_json::json!(performer);
            }
            _ => {}
        }
        (status, axum::Json(body)).into_response()
    }
}
