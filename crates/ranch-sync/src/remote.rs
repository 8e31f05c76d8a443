//! # Remote Collaborators
//!
//! The HTTP service layer, seen from the engine: something that can execute
//! a command, fetch a query, and persist an alert.
//!
//! ## Error Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  RemoteError::Unreachable  no answer at all (DNS, timeout, offline)     │
//! │      → mutation is queued and replayed later                            │
//! │                                                                         │
//! │  RemoteError::Rejected     the server answered and said no              │
//! │      → surfaced to the caller immediately, never queued                 │
//! │      → during replay: counted as a failed attempt, item stays queued    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use ranch_core::Alert;
use thiserror::Error;

use crate::operation::Domain;

/// What a remote call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never got an answer.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The server refused the request.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote execution capability for one domain.
#[async_trait]
pub trait Remote<D: Domain>: Send + Sync {
    async fn execute(&self, command: &D::Command) -> RemoteResult<D::Response>;

    async fn fetch(&self, query: &D::Query) -> RemoteResult<D::Response>;
}

/// Where raised and resolved alerts are persisted.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn persist(&self, alert: &Alert) -> RemoteResult<()>;
}

/// Alert store that keeps nothing beyond the registry's own memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAlertStore;

#[async_trait]
impl AlertStore for NoOpAlertStore {
    async fn persist(&self, _alert: &Alert) -> RemoteResult<()> {
        Ok(())
    }
}
