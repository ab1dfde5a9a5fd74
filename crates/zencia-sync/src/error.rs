//! # Sync Error Types
//!
//! The error taxonomy dashboard callers see.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Remote         │  │   Transport     │  │     Local               │ │
//! │  │  (never retried)│  │   (retryable)   │  │                         │ │
//! │  │  Unauthenticated│  │  Network        │  │  InvalidInput           │ │
//! │  │  Server         │  │  Timeout        │  │  Store                  │ │
//! │  │  Validation     │  │                 │  │  SerializationFailed    │ │
//! │  │  NotFound       │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Configuration  │  │  Internal                                   │  │
//! │  │  InvalidConfig  │  │  ChannelError, ShuttingDown, Internal       │  │
//! │  │  InvalidUrl     │  │                                             │  │
//! │  │  ConfigLoad/Save│  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use zencia_core::{FailureNotice, PendingAction, ValidationError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure surfaced by this crate.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// No credential, or the backend rejected it after one forced refresh.
    #[error("Not signed in: {0}")]
    Unauthenticated(String),

    /// The backend answered with an unexpected status, a non-JSON body or
    /// a body that does not decode.
    #[error("Server error{}: {message}", .status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    Server {
        status: Option<u16>,
        message: String,
    },

    /// The backend rejected the request content (400 / 409 / 422).
    #[error("Rejected by server: {0}")]
    Validation(String),

    /// The entity does not exist or is not visible to this user.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The request never reached the backend (DNS, refused, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded its bounded wait.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Input failed a local business rule; nothing was queued or sent.
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    /// Local persistence failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Failed to serialize a request.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The coordinator is shutting down.
    #[error("Sync coordinator is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<zencia_store::StoreError> for SyncError {
    fn from(err: zencia_store::StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<zencia_core::CoreError> for SyncError {
    fn from(err: zencia_core::CoreError) -> Self {
        match err {
            zencia_core::CoreError::Validation(v) => SyncError::InvalidInput(v),
            other => SyncError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// Transport-level reqwest failures.
///
/// ## Error Mapping
/// ```text
/// is_timeout()          → SyncError::Timeout
/// is_decode()           → SyncError::Server (protocol violation)
/// connect / other I/O   → SyncError::Network
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::Server {
                status: err.status().map(|s| s.as_u16()),
                message: format!("response did not decode: {}", err),
            }
        } else if err.is_builder() {
            SyncError::InvalidUrl(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the same request may succeed later unchanged.
    ///
    /// Only transport failures qualify. Everything the backend actually
    /// answered is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for the kinds a user can act on (sign in, fix input,
    /// resend).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthenticated(_)
                | SyncError::Server { .. }
                | SyncError::Validation(_)
                | SyncError::NotFound { .. }
                | SyncError::InvalidInput(_)
        )
    }

    /// Builds the notice shown when `action` is dropped because of this
    /// error.
    pub fn failure_notice(&self, action: &PendingAction) -> FailureNotice {
        FailureNotice::new(action.kind(), action.ticket_id(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout(8000).is_retryable());

        assert!(!SyncError::Unauthenticated("no token".into()).is_retryable());
        assert!(!SyncError::Validation("bad".into()).is_retryable());
        assert!(!SyncError::not_found("ticket", "T1").is_retryable());
        assert!(!SyncError::Server {
            status: Some(500),
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Server {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Server error (status 502): bad gateway");

        let err = SyncError::Server {
            status: None,
            message: "not json".into(),
        };
        assert_eq!(err.to_string(), "Server error: not json");
    }

    #[test]
    fn test_validation_passes_through() {
        let err: SyncError = ValidationError::UnsupportedDuration {
            duration: "30d".into(),
        }
        .into();
        assert!(matches!(
            err,
            SyncError::InvalidInput(ValidationError::UnsupportedDuration { .. })
        ));
        assert!(err.is_user_visible());
    }

    #[test]
    fn test_failure_notice_names_action() {
        let action = PendingAction::reply("T1", "hi", "Ada", Utc::now());
        let notice = SyncError::not_found("ticket", "T1").failure_notice(&action);
        assert_eq!(notice.ticket_id.as_deref(), Some("T1"));
        assert!(notice.message.starts_with("Could not send reply"));
        assert!(notice.message.contains("will not retry automatically"));
    }
}
