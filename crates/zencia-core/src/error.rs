//! # Error Types
//!
//! Domain-specific error types for zencia-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  zencia-core errors (this file)                                        │
//! │  ├── CoreError        - Domain state errors                            │
//! │  └── ValidationError  - Input / business rule failures                 │
//! │                                                                         │
//! │  zencia-store errors (separate crate)                                  │
//! │  └── StoreError       - Local persistence failures                     │
//! │                                                                         │
//! │  zencia-sync errors (separate crate)                                   │
//! │  └── SyncError        - What UI callers see (typed taxonomy)           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → UI notice             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while mutating cached domain state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A message referenced by id is not part of the ticket.
    #[error("Message {message_id} not found on ticket {ticket_id}")]
    MessageNotFound {
        ticket_id: String,
        message_id: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input and business rule validation errors.
///
/// These are surfaced to the user immediately and are never queued for
/// later delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The hardware id already has an active license.
    ///
    /// ## User Workflow
    /// ```text
    /// Issue license (hwid: HW1)
    ///      │
    ///      ▼
    /// Cached list: [HW1 active]
    ///      │
    ///      ▼
    /// DuplicateActiveLicense { hardware_id: "HW1" }   (no network call)
    /// ```
    #[error("Hardware ID {hardware_id} already has an active license. Each device can only have one license.")]
    DuplicateActiveLicense { hardware_id: String },

    /// The requested license duration is not an enabled plan.
    #[error("License duration '{duration}' is not available yet; only the trial plan can be issued")]
    UnsupportedDuration { duration: String },

    /// Ticket status may not move to the requested state.
    #[error("Ticket cannot move from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::DuplicateActiveLicense {
            hardware_id: "HW1".to_string(),
        };
        assert!(err.to_string().starts_with("Hardware ID HW1 already has an active license"));

        let err = ValidationError::Required {
            field: "content".to_string(),
        };
        assert_eq!(err.to_string(), "content is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::UnsupportedDuration {
            duration: "30d".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
