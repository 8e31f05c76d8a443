//! # ranch-sync: Offline-First Sync and Alert Engine
//!
//! Lets ranch records be written without connectivity. Mutations that cannot
//! reach the server are queued and replayed in order once it is reachable
//! again; reads go through a TTL cache that writes invalidate; alert rules
//! run over the records each domain touches.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ranch Sync Architecture                           │
//! │                                                                         │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐           │
//! │  │  Bovines   │ │  Health    │ │ Inventory  │ │  Finance   │  domains/ │
//! │  │  Facade    │ │  Facade    │ │  Facade    │ │  Facade    │           │
//! │  └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ └─────┬──────┘           │
//! │        │ one SyncEngine<D> each      │              │                   │
//! │        ▼              ▼              ▼              ▼                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ SyncEngine<D>                                                    │  │
//! │  │   TtlCache ── read / refresh / invalidate                       │  │
//! │  │   PendingQueue ── enqueue_or_execute / replay_pending (FIFO)    │  │
//! │  │   reconnect listener + replay timer (start / destroy)           │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  │                              │                       │
//! │          Remote<D> (HTTP layer)        ReachabilityObserver, Clock     │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ RuleEvaluator<S> ──drafts──► AlertRegistry (shared by facades)   │  │
//! │  │   eager: after an applied or replayed mutation                  │  │
//! │  │   scan:  PeriodicTask over server aggregates                    │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  SYNC EVENTS (broadcast): Queued, Replayed, ReplayFailed,              │
//! │  DeadLettered, ReplayFinished                                          │
//! │  ALERT EVENTS (broadcast): Raised, Resolved                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Engine
//! - [`engine`] - `SyncEngine`, replay and lifecycle
//! - [`cache`] - TTL read cache and invalidation scopes
//! - [`queue`] - Pending operations, retry policy, dead letters
//! - [`operation`] - `Domain`, `Command`, `Query` and `Submission`
//! - [`remote`] - Collaborator traits for the server and alert storage
//!
//! ### Alerts
//! - [`alerts`] - `AlertRegistry` with subject de-duplication
//! - [`evaluator`] - Runs rule sets over snapshots
//!
//! ### Runtime
//! - [`clock`] - Injectable time source
//! - [`reachability`] - Connectivity flag and change notifications
//! - [`scheduler`] - Cancellable periodic and listener tasks
//! - [`config`] - TOML + env configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ranch_sync::{AlertRegistry, EngineConfig, InventoryFacade, SyncEngine, SystemClock};
//!
//! let config = EngineConfig::load_or_default(None);
//! let clock = Arc::new(SystemClock);
//! let registry = AlertRegistry::new(clock.clone());
//!
//! let engine = SyncEngine::new(config.engine_settings(), remote, clock, reachability);
//! let inventory = InventoryFacade::new(engine, registry.clone(), config.scan_interval());
//! inventory.start()?;
//!
//! // Succeeds offline too; the adjustment is queued and replayed later.
//! let submission = inventory.adjust_stock(adjustment).await?;
//! println!("Queued: {}", submission.is_queued());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Engine
pub mod cache;
pub mod engine;
pub mod operation;
pub mod queue;
pub mod remote;

// Alerts
pub mod alerts;
pub mod evaluator;

// Domains
pub mod domains;

// Runtime
pub mod clock;
pub mod config;
pub mod error;
pub mod reachability;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

// Engine types
pub use cache::{CacheKey, Invalidation, Lookup, TtlCache};
pub use engine::{EngineSettings, ReplayHook, ReplayOutcome, ReplayReport, SyncEngine, SyncEvent};
pub use operation::{Command, Domain, Query, QueuedReceipt, Submission};
pub use queue::{BackoffPolicy, DeadLetter, OpId, PendingOperation, QueueHealth, RetryPolicy};
pub use remote::{AlertStore, NoOpAlertStore, Remote, RemoteError, RemoteResult};

// Alert types
pub use alerts::{AlertEvent, AlertRegistry, RaiseOutcome};
pub use evaluator::{RuleEvaluator, ScanSummary};

// Domain facades
pub use domains::{BovinesFacade, FinanceFacade, HealthFacade, InventoryFacade};

// Runtime types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{SyncError, SyncResult};
pub use reachability::{Connectivity, ManualReachability, ReachabilityObserver};
pub use scheduler::{ListenerTask, PeriodicTask};
