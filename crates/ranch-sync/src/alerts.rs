//! # Alert Registry
//!
//! Stores alerts raised by rule evaluation, de-duplicated by subject key.
//!
//! ## De-duplication
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  raise(draft)                                                           │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  ┌──────────────── write lock ────────────────┐                        │
//! │  │ active[draft.subject] exists?              │                        │
//! │  │   yes → Suppressed(existing), unchanged    │                        │
//! │  │   no  → Alert::from_draft, index, insert   │                        │
//! │  └────────────────────────────────────────────┘                        │
//! │     │ Created                                                           │
//! │     ▼                                                                   │
//! │  store.persist(alert)   best-effort: failure is logged, alert kept      │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  AlertEvent::Raised → subscribers                                       │
//! │                                                                         │
//! │  resolve(id, notes): sets resolved_at, frees the subject key so the     │
//! │  next firing creates a new alert. History keeps every alert.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check and the insert happen under one write lock, so two scans that
//! detect the same condition at once still produce a single alert.

use ranch_core::{Alert, AlertDraft, SubjectKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::remote::{AlertStore, NoOpAlertStore};

/// Default capacity of the alert event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Events and Outcomes
// =============================================================================

/// Published to subscribers when an alert is created or resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Raised(Alert),
    Resolved(Alert),
}

/// Result of raising a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum RaiseOutcome {
    /// A new alert was stored.
    Created(Alert),
    /// An unresolved alert already covers this subject; it is returned
    /// unchanged.
    Suppressed(Alert),
}

impl RaiseOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            RaiseOutcome::Created(alert) | RaiseOutcome::Suppressed(alert) => alert,
        }
    }

    pub fn into_alert(self) -> Alert {
        match self {
            RaiseOutcome::Created(alert) | RaiseOutcome::Suppressed(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RaiseOutcome::Created(_))
    }
}

// =============================================================================
// Alert Book
// =============================================================================

#[derive(Debug, Default)]
struct AlertBook {
    /// Every alert ever raised, in creation order.
    alerts: Vec<Alert>,
    by_id: HashMap<Uuid, usize>,
    /// Subject → id of its unresolved alert.
    active: HashMap<SubjectKey, Uuid>,
}

impl AlertBook {
    fn active_for(&self, subject: &SubjectKey) -> Option<&Alert> {
        let id = self.active.get(subject)?;
        self.get(id)
    }

    fn get(&self, id: &Uuid) -> Option<&Alert> {
        self.by_id.get(id).and_then(|&index| self.alerts.get(index))
    }

    fn insert(&mut self, alert: Alert) {
        self.by_id.insert(alert.id, self.alerts.len());
        self.active.insert(alert.subject.clone(), alert.id);
        self.alerts.push(alert);
    }
}

// =============================================================================
// Registry
// =============================================================================

struct RegistryInner {
    book: RwLock<AlertBook>,
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<AlertEvent>,
}

/// Shared alert registry. Clones share one book.
#[derive(Clone)]
pub struct AlertRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for AlertRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRegistry").finish_non_exhaustive()
    }
}

impl AlertRegistry {
    /// Creates a registry that keeps alerts in memory only.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Arc::new(NoOpAlertStore), clock, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a registry that persists through `store`.
    pub fn with_store(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        AlertRegistry {
            inner: Arc::new(RegistryInner {
                book: RwLock::new(AlertBook::default()),
                store,
                clock,
                events,
            }),
        }
    }

    /// Creates an alert unless an unresolved one already covers the subject.
    pub async fn raise(&self, draft: AlertDraft) -> RaiseOutcome {
        let outcome = {
            let mut book = self.inner.book.write().await;
            match book.active_for(&draft.subject) {
                Some(existing) => RaiseOutcome::Suppressed(existing.clone()),
                None => {
                    let alert = Alert::from_draft(draft, Uuid::new_v4(), self.inner.clock.now());
                    book.insert(alert.clone());
                    RaiseOutcome::Created(alert)
                }
            }
        };

        match &outcome {
            RaiseOutcome::Created(alert) => {
                info!(
                    alert_id = %alert.id,
                    subject = %alert.subject,
                    severity = %alert.severity,
                    rule = %alert.rule_id,
                    "Alert raised"
                );
                self.persist(alert).await;
                let _ = self.inner.events.send(AlertEvent::Raised(alert.clone()));
            }
            RaiseOutcome::Suppressed(alert) => {
                debug!(alert_id = %alert.id, subject = %alert.subject, "Duplicate alert suppressed");
            }
        }
        outcome
    }

    /// Marks an alert resolved.
    pub async fn resolve(&self, id: Uuid, notes: impl Into<String>) -> SyncResult<Alert> {
        let resolved = {
            let mut book = self.inner.book.write().await;
            let index = *book.by_id.get(&id).ok_or(SyncError::AlertNotFound(id))?;
            let now = self.inner.clock.now();
            let alert = book
                .alerts
                .get_mut(index)
                .ok_or_else(|| SyncError::Internal(format!("alert index {} out of bounds", index)))?;
            if !alert.resolve(notes, now) {
                return Err(SyncError::AlertAlreadyResolved(id));
            }
            let resolved = alert.clone();
            if book.active.get(&resolved.subject) == Some(&id) {
                book.active.remove(&resolved.subject);
            }
            resolved
        };

        info!(alert_id = %id, subject = %resolved.subject, "Alert resolved");
        self.persist(&resolved).await;
        let _ = self.inner.events.send(AlertEvent::Resolved(resolved.clone()));
        Ok(resolved)
    }

    /// Resolves the unresolved alert for `subject`, if there is one.
    pub async fn resolve_subject(
        &self,
        subject: &SubjectKey,
        notes: impl Into<String>,
    ) -> SyncResult<Option<Alert>> {
        let id = self.inner.book.read().await.active.get(subject).copied();
        match id {
            Some(id) => match self.resolve(id, notes).await {
                Ok(alert) => Ok(Some(alert)),
                // Resolved by someone else in between.
                Err(SyncError::AlertAlreadyResolved(_)) => Ok(None),
                Err(err) => Err(err),
            },
            None => Ok(None),
        }
    }

    async fn persist(&self, alert: &Alert) {
        if let Err(err) = self.inner.store.persist(alert).await {
            warn!(alert_id = %alert.id, error = %err, "Failed to persist alert; kept in memory");
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Unresolved alerts, most severe first, oldest first within a severity.
    pub async fn active_alerts(&self) -> Vec<Alert> {
        let book = self.inner.book.read().await;
        let mut active: Vec<Alert> = book
            .alerts
            .iter()
            .filter(|alert| alert.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        active
    }

    pub async fn active_for(&self, subject: &SubjectKey) -> Option<Alert> {
        self.inner.book.read().await.active_for(subject).cloned()
    }

    /// Every alert ever raised, resolved ones included, in creation order.
    pub async fn history(&self) -> Vec<Alert> {
        self.inner.book.read().await.alerts.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Alert> {
        self.inner.book.read().await.get(&id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.book.read().await.active.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{t0, RecordingAlertStore};
    use ranch_core::Severity;

    fn draft(entity: &str, severity: Severity) -> AlertDraft {
        AlertDraft::new(
            "inventory.low_stock",
            SubjectKey::new("inventory-item", entity, "low-stock"),
            severity,
            format!("{} below minimum", entity),
        )
    }

    fn registry() -> (AlertRegistry, Arc<RecordingAlertStore>, Arc<ManualClock>) {
        let store = Arc::new(RecordingAlertStore::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = AlertRegistry::with_store(store.clone(), clock.clone(), 16);
        (registry, store, clock)
    }

    #[tokio::test]
    async fn test_same_subject_is_deduplicated_until_resolved() {
        let (registry, store, _) = registry();

        let first = registry.raise(draft("i-1", Severity::Low)).await;
        let second = registry.raise(draft("i-1", Severity::High)).await;
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(second.alert(), first.alert());
        assert_eq!(second.alert().severity, Severity::Low);
        assert_eq!(registry.history().await.len(), 1);
        assert_eq!(store.persisted().len(), 1);

        registry.resolve(first.alert().id, "restocked").await.unwrap();
        assert!(registry.active_alerts().await.is_empty());

        let third = registry.raise(draft("i-1", Severity::Medium)).await;
        assert!(third.is_created());
        assert_ne!(third.alert().id, first.alert().id);
        assert_eq!(registry.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let (registry, _, _) = registry();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.resolve(missing, "x").await,
            Err(SyncError::AlertNotFound(id)) if id == missing
        ));

        let alert = registry.raise(draft("i-2", Severity::Low)).await.into_alert();
        registry.resolve(alert.id, "done").await.unwrap();
        assert!(matches!(
            registry.resolve(alert.id, "again").await,
            Err(SyncError::AlertAlreadyResolved(_))
        ));

        let kept = registry.get(alert.id).await.unwrap();
        assert_eq!(kept.resolution_notes.as_deref(), Some("done"));
        assert_eq!(kept.resolved_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_active_alerts_ordered_by_severity_then_age() {
        let (registry, _, clock) = registry();
        registry.raise(draft("a", Severity::Low)).await;
        clock.advance(chrono::Duration::seconds(1));
        registry.raise(draft("b", Severity::Critical)).await;
        clock.advance(chrono::Duration::seconds(1));
        registry.raise(draft("c", Severity::Low)).await;

        let subjects: Vec<String> = registry
            .active_alerts()
            .await
            .into_iter()
            .map(|alert| alert.subject.to_string())
            .collect();
        assert_eq!(
            subjects,
            vec![
                "inventory-item:b/low-stock",
                "inventory-item:a/low-stock",
                "inventory-item:c/low-stock",
            ]
        );
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_alert() {
        let (registry, store, _) = registry();
        store.set_failing(true);

        let outcome = registry.raise(draft("i-3", Severity::High)).await;
        assert!(outcome.is_created());
        assert!(store.persisted().is_empty());
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_events_and_resolve_subject() {
        let (registry, _, _) = registry();
        let mut events = registry.subscribe();

        let alert = registry.raise(draft("i-4", Severity::Medium)).await.into_alert();
        registry.raise(draft("i-4", Severity::Medium)).await;
        assert_eq!(events.recv().await.unwrap(), AlertEvent::Raised(alert.clone()));

        let subject = alert.subject.clone();
        let resolved = registry.resolve_subject(&subject, "fixed").await.unwrap();
        assert_eq!(resolved.map(|a| a.id), Some(alert.id));
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::Resolved(_)));
        assert!(events.try_recv().is_err());

        assert_eq!(registry.resolve_subject(&subject, "again").await.unwrap(), None);
        assert!(registry.active_for(&subject).await.is_none());
    }
}
