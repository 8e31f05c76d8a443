//! # ranch-core: Pure Domain Logic for the Ranch Sync Engine
//!
//! Everything here is deterministic and free of I/O: the record types the
//! four domains exchange with the server, integer money, payload validation,
//! and the alert rule machinery that turns a domain snapshot into at most one
//! alert draft per rule.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ranch Sync Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          HTTP service layer / UI (external collaborators)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   ranch-sync: facades, SyncEngine, TTL cache, queue, alerts     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ranch-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   alert   │  │   rules   │  │  catalog  │  │   │
//! │  │   │  Bovine   │  │ Severity  │  │ RuleSet   │  │ low stock │  │   │
//! │  │   │ HealthChk │  │ SubjectKey│  │ Severity  │  │ vitals    │  │   │
//! │  │   │ Inventory │  │ Alert     │  │   Scale   │  │ overrun   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records for bovines, health, inventory and finance
//! - [`money`] - Integer-cent money for the finance domain
//! - [`alert`] - Alert, draft, severity and subject key types
//! - [`rules`] - Rule predicates, rule sets and severity scales
//! - [`catalog`] - The concrete rules each domain registers
//! - [`validation`] - Payload checks run before anything is queued
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ranch_core::alert::Severity;
//! use ranch_core::rules::SeverityScale;
//!
//! // One abnormal vital sign is low severity, three or more is high.
//! let scale = SeverityScale::new([(1.0, Severity::Low), (2.0, Severity::Medium), (3.0, Severity::High)]);
//! assert_eq!(scale.classify(3.0), Some(Severity::High));
//! assert_eq!(scale.classify(0.0), None);
//! ```

pub mod alert;
pub mod catalog;
pub mod error;
pub mod money;
pub mod rules;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use alert::{Alert, AlertDraft, Severity, SubjectKey};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use rules::{AlertRule, NormalRange, Observed, RuleSet, SeverityScale};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of an ear tag or SKU.
pub const MAX_TAG_LEN: usize = 32;

/// Upper bound for a single recorded bovine weight, in kilograms.
///
/// Anything above this is a typo (grams entered as kilograms).
pub const MAX_BOVINE_WEIGHT_KG: f64 = 2_000.0;
