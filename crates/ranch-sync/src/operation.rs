//! # Typed Operations
//!
//! What a domain hands to the engine: a [`Domain`] names its command, query
//! and response types, and the engine stays generic over all of them.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  D::Command ──► enqueue_or_execute ──► Submission::Applied(D::Response) │
//! │   kind()                     │                                          │
//! │   invalidation()             └──────► Submission::Queued { receipt,     │
//! │                                          placeholder: D::placeholder() }│
//! │                                                                         │
//! │  D::Query ────► read / refresh ──────► D::Response (cached by key)      │
//! │   endpoint()                                                            │
//! │   cache_key()                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands are sum types, so a replay dispatcher on the remote side matches
//! exhaustively instead of switching on a string tag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::cache::{CacheKey, Invalidation};
use crate::error::SyncResult;
use crate::queue::OpId;

// =============================================================================
// Command / Query
// =============================================================================

/// A mutation. Queued verbatim while offline and replayed later.
pub trait Command: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    /// Short tag for logs and events (`"adjust_stock"`).
    fn kind(&self) -> &'static str;

    /// Cached reads this mutation makes stale once applied.
    fn invalidation(&self) -> Invalidation;
}

/// A read.
pub trait Query: fmt::Debug + Serialize + Send + Sync {
    /// Logical endpoint, used as the cache key prefix.
    fn endpoint(&self) -> String;

    /// Cache key for this read: endpoint plus the serialized query.
    fn cache_key(&self) -> SyncResult<CacheKey> {
        CacheKey::with_params(self.endpoint(), self)
    }
}

// =============================================================================
// Domain
// =============================================================================

/// Binds a domain's operation types together.
pub trait Domain: Send + Sync + 'static {
    /// Domain name for logs and events.
    const NAME: &'static str;

    type Command: Command;
    type Query: Query;
    type Response: Clone + fmt::Debug + Send + Sync + 'static;

    /// Locally synthesized result shown while `command` waits in the queue.
    ///
    /// Creates return the record with a local id; most other commands have
    /// nothing sensible to show and return `None`.
    fn placeholder(command: &Self::Command, receipt: &QueuedReceipt) -> Option<Self::Response> {
        let _ = (command, receipt);
        None
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Proof that a mutation was queued for later replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedReceipt {
    pub op_id: OpId,
    pub domain: &'static str,
    pub kind: &'static str,
    pub enqueued_at: DateTime<Utc>,
}

/// Outcome of a mutation: applied remotely now, or queued to sync later.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
    Applied(T),
    Queued {
        receipt: QueuedReceipt,
        placeholder: Option<T>,
    },
}

impl<T> Submission<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, Submission::Queued { .. })
    }

    /// The remote result, if the mutation was applied immediately.
    pub fn applied(self) -> Option<T> {
        match self {
            Submission::Applied(value) => Some(value),
            Submission::Queued { .. } => None,
        }
    }

    pub fn receipt(&self) -> Option<&QueuedReceipt> {
        match self {
            Submission::Applied(_) => None,
            Submission::Queued { receipt, .. } => Some(receipt),
        }
    }

    /// The applied value, or the placeholder while queued.
    pub fn value(&self) -> Option<&T> {
        match self {
            Submission::Applied(value) => Some(value),
            Submission::Queued { placeholder, .. } => placeholder.as_ref(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Submission<U> {
        match self {
            Submission::Applied(value) => Submission::Applied(f(value)),
            Submission::Queued {
                receipt,
                placeholder,
            } => Submission::Queued {
                receipt,
                placeholder: placeholder.map(f),
            },
        }
    }

    /// Maps the value with a fallible conversion.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Submission<U>, E> {
        Ok(match self {
            Submission::Applied(value) => Submission::Applied(f(value)?),
            Submission::Queued {
                receipt,
                placeholder,
            } => Submission::Queued {
                receipt,
                placeholder: placeholder.map(f).transpose()?,
            },
        })
    }
}
