//! # Domain Facades
//!
//! Thin typed adapters over one [`SyncEngine`] each.
//!
//! ## Facade Call Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  facade.adjust_stock(adjustment)                                        │
//! │     │                                                                   │
//! │     ├── validate payload            (invalid → SyncError::Validation)   │
//! │     ├── engine.enqueue_or_execute   (cache invalidated on success)      │
//! │     ├── Applied(item) → evaluator.evaluate(item)      eager rules       │
//! │     └── Submission<InventoryItem>                                       │
//! │                                                                         │
//! │  facade.start()                                                         │
//! │     ├── engine.start()              reconnect listener + replay timer   │
//! │     └── ScanSchedule                periodic rule scan over aggregates  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Facades hold no engine logic. Every payload shape stays here so the
//! engine only sees `Domain` associated types.

pub mod bovines;
pub mod finance;
pub mod health;
pub mod inventory;

pub use bovines::{BovineCommand, BovineQuery, BovineResponse, Bovines, BovinesFacade};
pub use finance::{Finance, FinanceCommand, FinanceFacade, FinanceQuery, FinanceResponse};
pub use health::{Health, HealthCommand, HealthFacade, HealthQuery, HealthResponse};
pub use inventory::{
    Inventory, InventoryCommand, InventoryFacade, InventoryQuery, InventoryResponse,
};

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::evaluator::ScanSummary;
use crate::scheduler::PeriodicTask;

/// Id for a record created while offline. Replaced by the server's id once
/// the create replays.
pub fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Builds the error for a response variant the call did not expect.
pub(crate) fn unexpected(expected: &str, actual: &impl fmt::Debug) -> SyncError {
    let rendered = format!("{:?}", actual);
    let variant = rendered
        .split(|c: char| c == '(' || c == ' ' || c == '{')
        .next()
        .unwrap_or_default()
        .to_string();
    SyncError::UnexpectedResponse {
        expected: expected.to_string(),
        actual: variant,
    }
}

// =============================================================================
// Scan Schedule
// =============================================================================

/// Owns a facade's periodic rule scan.
#[derive(Debug, Default)]
pub(crate) struct ScanSchedule {
    task: Mutex<Option<PeriodicTask>>,
}

impl ScanSchedule {
    /// Starts the scan unless it is already running.
    pub(crate) fn start<F, Fut>(&self, name: &'static str, period: Duration, mut scan: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<ScanSummary>> + Send + 'static,
    {
        let mut slot = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }

        *slot = Some(PeriodicTask::start(name, period, move || {
            let pass = scan();
            async move {
                match pass.await {
                    Ok(summary) => debug!(
                        task = name,
                        snapshots = summary.snapshots,
                        created = summary.created,
                        suppressed = summary.suppressed,
                        "Rule scan finished"
                    ),
                    Err(err) if err.is_retryable() => {
                        debug!(task = name, error = %err, "Rule scan skipped while offline")
                    }
                    Err(SyncError::ShuttingDown) => {}
                    Err(err) => warn!(task = name, error = %err, "Rule scan failed"),
                }
            }
        }));
    }

    pub(crate) fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(task);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    #[allow(dead_code)]
    enum Sample {
        Items(Vec<u8>),
        Removed { id: String },
        Empty,
    }

    #[test]
    fn test_unexpected_names_the_variant() {
        let err = unexpected("Item", &Sample::Items(vec![1]));
        assert_eq!(
            err.to_string(),
            "Unexpected response: expected Item, got Items"
        );
        let err = unexpected("Item", &Sample::Removed { id: "x".into() });
        assert!(err.to_string().ends_with("got Removed"));
        let err = unexpected("Item", &Sample::Empty);
        assert!(err.to_string().ends_with("got Empty"));
    }

    #[test]
    fn test_local_ids_are_unique() {
        let a = local_id();
        assert!(a.starts_with("local-"));
        assert_ne!(a, local_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_schedule_runs_until_stopped() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let schedule = ScanSchedule::default();
        schedule.start("test.scan", Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ScanSummary::default())
            }
        });
        assert!(schedule.is_running());

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        schedule.stop();
        assert!(!schedule.is_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
