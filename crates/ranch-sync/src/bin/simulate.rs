//! # Offline Replay Simulation
//!
//! Drives the inventory facade through a connectivity outage against an
//! in-memory server.
//!
//! ```text
//! offline ──► adjust_stock x2 (queued) ──► go_online ──► reconnect replay
//!     ──► low-stock alert ──► inventory scan (already raised) ──► destroy
//! ```
//!
//! Run with `RUST_LOG=ranch_sync=debug` for the engine's own logs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ranch_core::{InventoryItem, StockAdjustment};
use ranch_sync::domains::{Inventory, InventoryCommand, InventoryQuery, InventoryResponse};
use ranch_sync::{
    AlertEvent, AlertRegistry, Clock, Command, EngineConfig, InventoryFacade, ManualReachability, Remote,
    RemoteError, RemoteResult, SyncEngine, SyncEvent, SystemClock,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// =============================================================================
// In-Memory Server
// =============================================================================

struct InMemoryInventory {
    items: Mutex<HashMap<String, InventoryItem>>,
}

impl InMemoryInventory {
    fn seeded(items: Vec<InventoryItem>) -> Self {
        InMemoryInventory {
            items: Mutex::new(items.into_iter().map(|i| (i.id.clone(), i)).collect()),
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, InventoryItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Remote<Inventory> for InMemoryInventory {
    async fn execute(&self, command: &InventoryCommand) -> RemoteResult<InventoryResponse> {
        let mut items = self.items();
        match command {
            InventoryCommand::AdjustStock(adjustment) => {
                let item = items
                    .get_mut(&adjustment.item_id)
                    .ok_or_else(|| RemoteError::rejected(404, "unknown item"))?;
                item.quantity = (item.quantity + adjustment.delta).max(0.0);
                item.updated_at = Utc::now();
                Ok(InventoryResponse::Item(item.clone()))
            }
            other => Err(RemoteError::rejected(501, format!("{} not simulated", other.kind()))),
        }
    }

    async fn fetch(&self, query: &InventoryQuery) -> RemoteResult<InventoryResponse> {
        let items = self.items();
        match query {
            InventoryQuery::LowStock => Ok(InventoryResponse::Items(
                items.values().filter(|i| i.is_below_minimum()).cloned().collect(),
            )),
            InventoryQuery::Expiring { .. } => Ok(InventoryResponse::Items(Vec::new())),
            InventoryQuery::Item { id } => items
                .get(id)
                .cloned()
                .map(InventoryResponse::Item)
                .ok_or_else(|| RemoteError::rejected(404, "unknown item")),
            InventoryQuery::Items { .. } => Ok(InventoryResponse::Items(items.values().cloned().collect())),
        }
    }
}

// =============================================================================
// Scenario
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = EngineConfig::new();
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let server = Arc::new(InMemoryInventory::seeded(vec![InventoryItem {
        id: "hay-1".to_string(),
        sku: "HAY-ALF".to_string(),
        name: "Alfalfa bales".to_string(),
        category: "feed".to_string(),
        unit: "bale".to_string(),
        quantity: 12.0,
        minimum_quantity: 10.0,
        expires_on: None,
        updated_at: clock.now(),
    }]));
    let reachability = Arc::new(ManualReachability::offline());

    let registry = AlertRegistry::with_store(
        Arc::new(ranch_sync::NoOpAlertStore),
        clock.clone(),
        config.alerts.channel_capacity,
    );
    let engine = SyncEngine::new(
        config.engine_settings(),
        server.clone(),
        clock.clone(),
        reachability.clone(),
    );
    let inventory = InventoryFacade::new(engine, registry.clone(), config.scan_interval());

    let mut sync_events = inventory.engine().subscribe_events();
    let mut alert_events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match alert_events.recv().await {
                Ok(AlertEvent::Raised(alert)) => {
                    info!(severity = %alert.severity, subject = %alert.subject, "ALERT {}", alert.title)
                }
                Ok(AlertEvent::Resolved(alert)) => info!(subject = %alert.subject, "Alert resolved"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Alert listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    inventory.start()?;
    info!("Inventory facade started while offline");

    for delta in [-4.0, -5.0] {
        let submission = inventory
            .adjust_stock(StockAdjustment {
                item_id: "hay-1".to_string(),
                delta,
                reason: "feeding".to_string(),
            })
            .await?;
        if let Some(receipt) = submission.receipt() {
            info!(op_id = %receipt.op_id, kind = receipt.kind, "Adjustment queued");
        }
    }
    info!(pending = inventory.engine().queue_health().await.pending, "Going online");

    reachability.go_online();
    let report = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match sync_events.recv().await {
                Ok(SyncEvent::Replayed { op_id, kind, .. }) => info!(%op_id, kind, "Replayed"),
                Ok(SyncEvent::ReplayFinished { report, .. }) => return Some(report),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await?;
    if let Some(report) = report {
        info!(
            succeeded = report.succeeded,
            remaining = report.remaining,
            "Replay finished"
        );
    }

    let item = inventory.get_item("hay-1").await?;
    info!(quantity = item.quantity, minimum = item.minimum_quantity, "Server stock after replay");

    let summary = inventory.scan().await?;
    info!(created = summary.created, suppressed = summary.suppressed, "Scan finished");

    for alert in registry.active_alerts().await {
        info!(severity = %alert.severity, "{}: {}", alert.title, alert.description);
    }

    inventory.destroy();
    // Let the alert listener drain before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Inventory facade destroyed");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: INFO, DEBUG for the ranch crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ranch=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
