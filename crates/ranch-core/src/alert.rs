//! # Alert Types
//!
//! What a firing rule produces ([`AlertDraft`]) and what the registry stores
//! ([`Alert`]).
//!
//! ## Alert Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  rule fires ──► AlertDraft ──► registry: active alert for subject?     │
//! │                                   │                                     │
//! │                       yes ◄───────┴───────► no                          │
//! │                        │                     │                          │
//! │                        ▼                     ▼                          │
//! │              existing alert          Alert { resolved_at: None }        │
//! │              returned unchanged             │                           │
//! │                                             │ resolve(id, notes)        │
//! │                                             ▼                           │
//! │                                  Alert { resolved_at: Some(..) }        │
//! │                                  kept in history, never deleted         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Severity
// =============================================================================

/// Alert severity, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// =============================================================================
// Subject Key
// =============================================================================

/// Composite of entity and condition used to de-duplicate alerts.
///
/// `inventory-item:i-42` + `low-stock` → `inventory-item:i-42/low-stock`.
/// Two drafts with the same key describe the same ongoing problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// Builds a key from an entity type, entity id and condition name.
    pub fn new(entity_type: &str, entity_id: &str, condition: &str) -> Self {
        SubjectKey(format!("{}:{}/{}", entity_type, entity_id, condition))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Alert Draft
// =============================================================================

/// The output of a firing rule, before de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertDraft {
    /// Id of the rule that produced this draft.
    pub rule_id: String,
    pub subject: SubjectKey,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommended_actions: Vec<String>,
}

impl AlertDraft {
    pub fn new(
        rule_id: impl Into<String>,
        subject: SubjectKey,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        AlertDraft {
            rule_id: rule_id.into(),
            subject,
            severity,
            title: title.into(),
            description: String::new(),
            recommended_actions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.recommended_actions.push(action.into());
        self
    }
}

// =============================================================================
// Alert
// =============================================================================

/// A stored alert.
///
/// Only [`Alert::resolve`] mutates it after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Alert {
    #[ts(as = "String")]
    pub id: Uuid,
    pub rule_id: String,
    pub subject: SubjectKey,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommended_actions: Vec<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

impl Alert {
    /// Materializes a draft.
    pub fn from_draft(draft: AlertDraft, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Alert {
            id,
            rule_id: draft.rule_id,
            subject: draft.subject,
            severity: draft.severity,
            title: draft.title,
            description: draft.description,
            recommended_actions: draft.recommended_actions,
            created_at,
            resolved_at: None,
            resolution_notes: None,
        }
    }

    /// True until resolved.
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Marks the alert resolved. Returns false if it already was.
    pub fn resolve(&mut self, notes: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.resolved_at.is_some() {
            return false;
        }
        self.resolved_at = Some(at);
        self.resolution_notes = Some(notes.into());
        true
    }
}
