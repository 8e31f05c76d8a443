//! # Inventory Facade
//!
//! Supplies on hand: items, stock movements, and the low-stock and
//! expiring-soon rules.
//!
//! ## Rule Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add_item / update_item / adjust_stock  ──Applied(item)──►  eager       │
//! │                                                    low_stock(item)      │
//! │                                                    expiring_soon(item)  │
//! │                                                                         │
//! │  scan (every scan_interval)                                             │
//! │     refresh inventory/low-stock  ┐                                      │
//! │     refresh inventory/expiring   ┴─► merge by id ─► evaluate_all        │
//! │                                                                         │
//! │  replayed item (queued offline)  ──ReplayHook──►  same eager rules      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures_util::future::try_join;
use ranch_core::catalog::inventory::{self as rules, EXPIRY_HORIZON_DAYS};
use ranch_core::validation::{validate_adjustment, validate_name, validate_new_item, validate_quantity};
use ranch_core::{InventoryItem, InventoryPatch, NewInventoryItem, RuleSet, StockAdjustment};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{local_id, unexpected, ScanSchedule};
use crate::alerts::{AlertRegistry, RaiseOutcome};
use crate::cache::Invalidation;
use crate::engine::{ReplayHook, SyncEngine};
use crate::error::SyncResult;
use crate::evaluator::{RuleEvaluator, ScanSummary};
use crate::operation::{Command, Domain, Query, QueuedReceipt, Submission};

// =============================================================================
// Operations
// =============================================================================

/// Marker for the inventory domain.
#[derive(Debug)]
pub struct Inventory;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InventoryCommand {
    AddItem(NewInventoryItem),
    UpdateItem { id: String, patch: InventoryPatch },
    AdjustStock(StockAdjustment),
    RemoveItem { id: String },
}

impl Command for InventoryCommand {
    fn kind(&self) -> &'static str {
        match self {
            InventoryCommand::AddItem(_) => "add_item",
            InventoryCommand::UpdateItem { .. } => "update_item",
            InventoryCommand::AdjustStock(_) => "adjust_stock",
            InventoryCommand::RemoveItem { .. } => "remove_item",
        }
    }

    fn invalidation(&self) -> Invalidation {
        // Lists, single items and the low-stock/expiring aggregates all
        // shift with any stock change.
        Invalidation::endpoint("inventory/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InventoryQuery {
    Items { category: Option<String> },
    Item { id: String },
    LowStock,
    Expiring { within_days: i64 },
}

impl Query for InventoryQuery {
    fn endpoint(&self) -> String {
        match self {
            InventoryQuery::Items { .. } => "inventory/items".to_string(),
            InventoryQuery::Item { id } => format!("inventory/items/{}", id),
            InventoryQuery::LowStock => "inventory/low-stock".to_string(),
            InventoryQuery::Expiring { .. } => "inventory/expiring".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryResponse {
    Items(Vec<InventoryItem>),
    Item(InventoryItem),
    Removed { id: String },
}

impl InventoryResponse {
    pub fn into_items(self) -> SyncResult<Vec<InventoryItem>> {
        match self {
            InventoryResponse::Items(items) => Ok(items),
            other => Err(unexpected("Items", &other)),
        }
    }

    pub fn into_item(self) -> SyncResult<InventoryItem> {
        match self {
            InventoryResponse::Item(item) => Ok(item),
            other => Err(unexpected("Item", &other)),
        }
    }
}

impl Domain for Inventory {
    const NAME: &'static str = "inventory";
    type Command = InventoryCommand;
    type Query = InventoryQuery;
    type Response = InventoryResponse;

    fn placeholder(command: &InventoryCommand, receipt: &QueuedReceipt) -> Option<InventoryResponse> {
        match command {
            InventoryCommand::AddItem(new) => Some(InventoryResponse::Item(
                new.clone().into_local(local_id(), receipt.enqueued_at),
            )),
            InventoryCommand::RemoveItem { id } => Some(InventoryResponse::Removed { id: id.clone() }),
            _ => None,
        }
    }
}

// =============================================================================
// Replayed Items
// =============================================================================

struct ReplayedItems(RuleEvaluator<InventoryItem>);

#[async_trait]
impl ReplayHook<Inventory> for ReplayedItems {
    async fn applied(&self, _engine: &SyncEngine<Inventory>, _command: &InventoryCommand, response: InventoryResponse) {
        if let InventoryResponse::Item(item) = response {
            self.0.evaluate(item).await;
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

pub struct InventoryFacade {
    engine: SyncEngine<Inventory>,
    evaluator: RuleEvaluator<InventoryItem>,
    scan_interval: Duration,
    schedule: ScanSchedule,
}

impl InventoryFacade {
    pub fn new(engine: SyncEngine<Inventory>, registry: AlertRegistry, scan_interval: Duration) -> Self {
        let rules = RuleSet::new()
            .with(rules::low_stock(scan_interval))
            .with(rules::expiring_soon(scan_interval));
        let evaluator = RuleEvaluator::new(rules, registry, engine.clock());
        engine.set_replay_hook(Arc::new(ReplayedItems(evaluator.clone())));
        InventoryFacade {
            engine,
            evaluator,
            scan_interval,
            schedule: ScanSchedule::default(),
        }
    }

    pub fn engine(&self) -> &SyncEngine<Inventory> {
        &self.engine
    }

    pub fn registry(&self) -> &AlertRegistry {
        self.evaluator.registry()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list_items(&self, category: Option<&str>) -> SyncResult<Vec<InventoryItem>> {
        let query = InventoryQuery::Items {
            category: category.map(str::to_string),
        };
        self.engine.read(&query).await?.into_items()
    }

    pub async fn get_item(&self, id: &str) -> SyncResult<InventoryItem> {
        let query = InventoryQuery::Item { id: id.to_string() };
        self.engine.read(&query).await?.into_item()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn add_item(&self, new: NewInventoryItem) -> SyncResult<Submission<InventoryItem>> {
        validate_new_item(&new)?;
        self.submit_item(InventoryCommand::AddItem(new)).await
    }

    pub async fn update_item(
        &self,
        id: &str,
        patch: InventoryPatch,
    ) -> SyncResult<Submission<InventoryItem>> {
        if let Some(name) = &patch.name {
            validate_name("name", name)?;
        }
        if let Some(minimum) = patch.minimum_quantity {
            validate_quantity("minimum_quantity", minimum)?;
        }
        self.submit_item(InventoryCommand::UpdateItem {
            id: id.to_string(),
            patch,
        })
        .await
    }

    /// Applies a relative stock movement.
    pub async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
    ) -> SyncResult<Submission<InventoryItem>> {
        validate_adjustment(&adjustment)?;
        self.submit_item(InventoryCommand::AdjustStock(adjustment)).await
    }

    pub async fn remove_item(&self, id: &str) -> SyncResult<Submission<()>> {
        let submission = self
            .engine
            .enqueue_or_execute(InventoryCommand::RemoveItem { id: id.to_string() })
            .await?;
        Ok(submission.map(|_| ()))
    }

    async fn submit_item(&self, command: InventoryCommand) -> SyncResult<Submission<InventoryItem>> {
        let submission = self
            .engine
            .enqueue_or_execute(command)
            .await?
            .try_map(InventoryResponse::into_item)?;

        if let Submission::Applied(item) = &submission {
            self.evaluator.evaluate(item.clone()).await;
        }
        Ok(submission)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Runs the stock rules over fresh low-stock and expiring aggregates.
    pub async fn scan(&self) -> SyncResult<ScanSummary> {
        scan(&self.engine, &self.evaluator).await
    }

    /// Evaluates the stock rules for one item without fetching anything.
    pub async fn evaluate_item(&self, item: InventoryItem) -> Vec<RaiseOutcome> {
        self.evaluator.evaluate(item).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts replay triggers and the periodic rule scan.
    pub fn start(&self) -> SyncResult<()> {
        self.engine.start()?;

        let engine = self.engine.clone();
        let evaluator = self.evaluator.clone();
        self.schedule.start("inventory.scan", self.scan_interval, move || {
            let engine = engine.clone();
            let evaluator = evaluator.clone();
            async move { scan(&engine, &evaluator).await }
        });
        Ok(())
    }

    pub fn destroy(&self) {
        self.schedule.stop();
        self.engine.destroy();
    }

    pub fn is_scanning(&self) -> bool {
        self.schedule.is_running()
    }
}

async fn scan(
    engine: &SyncEngine<Inventory>,
    evaluator: &RuleEvaluator<InventoryItem>,
) -> SyncResult<ScanSummary> {
    let (low, expiring) = try_join(
        engine.refresh(&InventoryQuery::LowStock),
        engine.refresh(&InventoryQuery::Expiring {
            within_days: EXPIRY_HORIZON_DAYS,
        }),
    )
    .await?;

    let mut items: BTreeMap<String, InventoryItem> = BTreeMap::new();
    for item in low.into_items()?.into_iter().chain(expiring.into_items()?) {
        items.insert(item.id.clone(), item);
    }
    Ok(evaluator.evaluate_all(items.into_values()).await)
}
