use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these —
// never on the human-readable message string.

/// Stable error code constants.
///
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const SLOT_EMPTY: &str = "SLOT_EMPTY";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type used across the engine.
///
/// Every asynchronous operation resolves with either a success value or one
/// of these — no panics cross the store boundary into callers. Each variant
/// maps to a stable code (see [`error_code`]).
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Referenced batch, size line, or other record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Input data is invalid. Rejected before any store interaction.
    #[error("{0}")]
    Validation(String),

    /// An operation required a slot assignment and the slot holds none.
    /// Benign for automatic actions — see the rack supervisor.
    #[error("{0}")]
    SlotEmpty(String),

    /// Storage backend failure, reported verbatim. Retry policy is the
    /// caller's responsibility.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::SlotEmpty(_) => error_code::SLOT_EMPTY,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// Whether this is the benign "slot empty or invalid" condition.
    pub fn is_slot_empty(&self) -> bool {
        matches!(self, ServiceError::SlotEmpty(_))
    }
}
