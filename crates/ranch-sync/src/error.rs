//! # Sync Error Types
//!
//! Error types for the sync engine and the domain facades.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │       Payload           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RemoteRejected │  │  Validation             │ │
//! │  │  ConfigLoad     │  │  Unreachable    │  │  SerializationFailed    │ │
//! │  │  ConfigSave     │  │  Unexpected     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │     Alerts      │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  AlertNotFound  │  │  ShuttingDown   │                              │
//! │  │  AlreadyResolved│  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A mutation attempted offline is not an error: it comes back as
//! `Submission::Queued`. `Unreachable` only reaches callers on the read path,
//! where there is nothing to queue.

use ranch_core::ValidationError;
use thiserror::Error;
use uuid::Uuid;

use crate::remote::RemoteError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type for everything the engine surfaces to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The server answered and refused the request. Never queued.
    #[error("Rejected by server ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// No connectivity on a path that cannot queue (reads).
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The remote answered with a response of the wrong shape.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse { expected: String, actual: String },

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Failed to serialize query parameters for a cache key.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Payload failed validation before reaching the engine.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Alert Errors
    // =========================================================================
    /// No alert with this id.
    #[error("Alert {0} not found")]
    AlertNotFound(Uuid),

    /// The alert was resolved earlier.
    #[error("Alert {0} is already resolved")]
    AlertAlreadyResolved(Uuid),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The engine or facade was destroyed.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unreachable(reason) => SyncError::Unreachable(reason),
            RemoteError::Rejected { status, message } => {
                SyncError::RemoteRejected { status, message }
            }
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
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
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if trying again later may succeed.
    ///
    /// Only connectivity loss qualifies. A server rejection is final until
    /// the caller changes the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Unreachable(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
