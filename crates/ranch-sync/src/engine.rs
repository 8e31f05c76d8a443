//! # Sync Engine
//!
//! One coordinator per domain. Owns that domain's TTL cache and pending
//! queue, decides execute-now vs. enqueue, and drives replay.
//!
//! ## Mutation State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue_or_execute(cmd)                                                │
//! │        │                                                                │
//! │        ├── is_reachable() == false ────────────────► ENQUEUE            │
//! │        │                                               │                │
//! │        ▼                                               ▼                │
//! │  remote.execute(cmd)                      Submission::Queued {          │
//! │        │                                    receipt, placeholder }      │
//! │        ├── Ok(resp) ──► cache.invalidate(cmd.invalidation())            │
//! │        │                Submission::Applied(resp)                       │
//! │        │                                                                │
//! │        ├── Err(Unreachable) ──► ENQUEUE (the flag was stale)            │
//! │        │                                                                │
//! │        └── Err(Rejected) ──► SyncError::RemoteRejected (not queued)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replay Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  trigger (reconnect listener | safety-net timer | manual call)          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ReplayGuard::acquire ── held ──► ReplayOutcome::AlreadyRunning         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  snapshot = queue.snapshot(now)      (later enqueues wait)              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  for op in snapshot (FIFO):                                             │
//! │     Ok          → queue.complete, cache.invalidate, hook, Replayed      │
//! │     Unreachable → untouched, deferred, next item still attempted        │
//! │     Rejected    → record_failure (retained | dead-lettered)             │
//! │     never abort the pass, never reorder                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replay Hook
//! A facade registers a [`ReplayHook`] to receive the server's response for
//! each replayed command, so rules that run after an applied mutation also
//! run for mutations that were queued offline.
//!
//! ## Teardown
//! `destroy()` stops the listener and the timer and refuses new work. It
//! does not cancel remote calls already in flight; when those complete they
//! leave the cache and the queue alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{Invalidation, Lookup, TtlCache};
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::operation::{Command, Domain, Query, QueuedReceipt, Submission};
use crate::queue::{DeadLetter, FailureOutcome, OpId, PendingOperation, PendingQueue, QueueHealth, RetryPolicy};
use crate::reachability::ReachabilityObserver;
use crate::remote::{Remote, RemoteError};
use crate::scheduler::{ListenerTask, PeriodicTask};

// =============================================================================
// Settings
// =============================================================================

/// Runtime settings for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub cache_ttl: chrono::Duration,
    /// Period of the replay safety-net timer.
    pub replay_interval: Duration,
    pub retry: RetryPolicy,
    /// Capacity of the sync event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            cache_ttl: chrono::Duration::seconds(300),
            replay_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            event_capacity: 64,
        }
    }
}

// =============================================================================
// Events and Reports
// =============================================================================

/// Queue and replay notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Queued {
        domain: &'static str,
        op_id: OpId,
        kind: &'static str,
    },
    Replayed {
        domain: &'static str,
        op_id: OpId,
        kind: &'static str,
    },
    ReplayFailed {
        domain: &'static str,
        op_id: OpId,
        kind: &'static str,
        attempts: u32,
        error: String,
    },
    DeadLettered {
        domain: &'static str,
        op_id: OpId,
        kind: &'static str,
        attempts: u32,
    },
    ReplayFinished {
        domain: &'static str,
        report: ReplayReport,
    },
}

/// Counters for one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Rejected by the server; still queued unless dead-lettered.
    pub failed: usize,
    pub dead_lettered: usize,
    /// Hit connectivity loss mid-pass; untouched.
    pub deferred: usize,
    /// Queue length after the pass.
    pub remaining: usize,
}

/// Result of asking for a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Nothing eligible to replay.
    Idle,
    /// The server is unreachable; nothing attempted.
    Offline,
    /// Another pass holds the guard; this trigger is dropped.
    AlreadyRunning,
    Completed(ReplayReport),
}

// =============================================================================
// Replay Hook
// =============================================================================

/// Receives the server's answer for every command applied during replay.
///
/// Runs after the item has left the queue and its cache scope has been
/// invalidated, before [`SyncEvent::Replayed`] is published.
#[async_trait]
pub trait ReplayHook<D: Domain>: Send + Sync {
    async fn applied(&self, engine: &SyncEngine<D>, command: &D::Command, response: D::Response);
}

// =============================================================================
// Replay Guard
// =============================================================================

/// Held for the duration of a replay pass.
struct ReplayGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReplayGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReplayGuard { flag })
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

struct EngineTasks {
    _reconnect: ListenerTask,
    _replay: PeriodicTask,
}

struct Inner<D: Domain> {
    settings: EngineSettings,
    remote: Arc<dyn Remote<D>>,
    clock: Arc<dyn Clock>,
    reachability: Arc<dyn ReachabilityObserver>,
    cache: Mutex<TtlCache<D::Response>>,
    queue: Mutex<PendingQueue<D::Command>>,
    replaying: AtomicBool,
    destroyed: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
    replay_hook: StdRwLock<Option<Arc<dyn ReplayHook<D>>>>,
    tasks: StdMutex<Option<EngineTasks>>,
}

/// Offline-first coordinator for domain `D`.
///
/// Cheap to clone; clones share one cache and one queue.
pub struct SyncEngine<D: Domain> {
    inner: Arc<Inner<D>>,
}

impl<D: Domain> Clone for SyncEngine<D> {
    fn clone(&self) -> Self {
        SyncEngine {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Domain> std::fmt::Debug for SyncEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("domain", &D::NAME)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl<D: Domain> SyncEngine<D> {
    /// Creates an engine. Nothing runs in the background until [`start`].
    ///
    /// [`start`]: SyncEngine::start
    pub fn new(
        settings: EngineSettings,
        remote: Arc<dyn Remote<D>>,
        clock: Arc<dyn Clock>,
        reachability: Arc<dyn ReachabilityObserver>,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let inner = Inner {
            cache: Mutex::new(TtlCache::new(settings.cache_ttl)),
            queue: Mutex::new(PendingQueue::new(settings.retry.clone())),
            settings,
            remote,
            clock,
            reachability,
            replaying: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            events,
            replay_hook: StdRwLock::new(None),
            tasks: StdMutex::new(None),
        };
        SyncEngine {
            inner: Arc::new(inner),
        }
    }

    pub fn domain(&self) -> &'static str {
        D::NAME
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachability.is_reachable()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> SyncResult<()> {
        if self.is_destroyed() {
            return Err(SyncError::ShuttingDown);
        }
        Ok(())
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Installs the hook called for each command applied during replay,
    /// replacing any previous one.
    ///
    /// The hook is handed the engine on every call; it must not hold a
    /// clone of it.
    pub fn set_replay_hook(&self, hook: Arc<dyn ReplayHook<D>>) {
        let mut slot = match self.inner.replay_hook.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(hook);
    }

    fn replay_hook(&self) -> Option<Arc<dyn ReplayHook<D>>> {
        match self.inner.replay_hook.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Executes `command` now, or queues it when the server is unreachable.
    ///
    /// A server rejection is returned as [`SyncError::RemoteRejected`] and
    /// nothing is queued.
    pub async fn enqueue_or_execute(
        &self,
        command: D::Command,
    ) -> SyncResult<Submission<D::Response>> {
        self.ensure_live()?;

        if !self.is_reachable() {
            return Ok(self.enqueue(command).await);
        }

        debug!(domain = D::NAME, kind = command.kind(), "Executing command");
        match self.inner.remote.execute(&command).await {
            Ok(response) => {
                if self.is_destroyed() {
                    warn!(
                        domain = D::NAME,
                        kind = command.kind(),
                        "Command completed after teardown; cache left untouched"
                    );
                    return Ok(Submission::Applied(response));
                }
                let removed = self.invalidate(&command.invalidation()).await;
                debug!(domain = D::NAME, kind = command.kind(), removed, "Command applied");
                Ok(Submission::Applied(response))
            }
            Err(RemoteError::Unreachable(reason)) => {
                self.ensure_live()?;
                info!(
                    domain = D::NAME,
                    kind = command.kind(),
                    %reason,
                    "Server unreachable during execute, queuing command"
                );
                Ok(self.enqueue(command).await)
            }
            Err(err) => {
                warn!(domain = D::NAME, kind = command.kind(), error = %err, "Command rejected");
                Err(err.into())
            }
        }
    }

    async fn enqueue(&self, command: D::Command) -> Submission<D::Response> {
        let enqueued_at = self.now();
        let kind = command.kind();
        let op_id = {
            let mut queue = self.inner.queue.lock().await;
            queue.enqueue(command.clone(), enqueued_at)
        };

        let receipt = QueuedReceipt {
            op_id,
            domain: D::NAME,
            kind,
            enqueued_at,
        };
        let placeholder = D::placeholder(&command, &receipt);

        info!(domain = D::NAME, %op_id, kind, "Command queued for replay");
        self.publish(SyncEvent::Queued {
            domain: D::NAME,
            op_id,
            kind,
        });

        Submission::Queued {
            receipt,
            placeholder,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cached read. Misses and expired entries go to the remote.
    pub async fn read(&self, query: &D::Query) -> SyncResult<D::Response> {
        self.ensure_live()?;
        let key = query.cache_key()?;

        let generation = {
            let mut cache = self.inner.cache.lock().await;
            match cache.lookup(&key, self.now()) {
                Lookup::Hit(value) => {
                    debug!(domain = D::NAME, %key, "Cache hit");
                    return Ok(value);
                }
                Lookup::Expired => debug!(domain = D::NAME, %key, "Cache entry expired"),
                Lookup::Miss => debug!(domain = D::NAME, %key, "Cache miss"),
            }
            cache.generation()
        };

        self.fetch_into_cache(query, key, generation).await
    }

    /// Uncached read that repopulates the cache.
    pub async fn refresh(&self, query: &D::Query) -> SyncResult<D::Response> {
        self.ensure_live()?;
        let key = query.cache_key()?;
        let generation = self.inner.cache.lock().await.generation();
        self.fetch_into_cache(query, key, generation).await
    }

    async fn fetch_into_cache(
        &self,
        query: &D::Query,
        key: crate::cache::CacheKey,
        generation: u64,
    ) -> SyncResult<D::Response> {
        if !self.is_reachable() {
            return Err(SyncError::Unreachable(format!("{} while offline", key)));
        }

        let response = self.inner.remote.fetch(query).await?;

        if self.is_destroyed() {
            debug!(domain = D::NAME, %key, "Fetch completed after teardown; not cached");
            return Ok(response);
        }

        let stored = self.inner.cache.lock().await.set_if_current(
            key.clone(),
            response.clone(),
            self.now(),
            generation,
        );
        if !stored {
            debug!(domain = D::NAME, %key, "Cache invalidated during fetch; result not cached");
        }
        Ok(response)
    }

    /// Drops cached reads covered by `scope`. Returns how many were dropped.
    pub async fn invalidate(&self, scope: &Invalidation) -> usize {
        self.inner.cache.lock().await.invalidate(scope)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Runs one replay pass over the queue.
    pub async fn replay_pending(&self) -> SyncResult<ReplayOutcome> {
        self.ensure_live()?;

        let Some(_guard) = ReplayGuard::acquire(&self.inner.replaying) else {
            debug!(domain = D::NAME, "Replay already running, trigger ignored");
            return Ok(ReplayOutcome::AlreadyRunning);
        };

        if !self.is_reachable() {
            return Ok(ReplayOutcome::Offline);
        }

        let batch = self.inner.queue.lock().await.snapshot(self.now());
        if batch.is_empty() {
            return Ok(ReplayOutcome::Idle);
        }

        info!(domain = D::NAME, count = batch.len(), "Replaying pending operations");
        let mut report = ReplayReport::default();

        for op in batch {
            if self.is_destroyed() {
                info!(domain = D::NAME, "Engine destroyed mid-replay, stopping pass");
                break;
            }
            report.attempted += 1;
            self.replay_one(op, &mut report).await;
        }

        report.remaining = self.inner.queue.lock().await.len();
        info!(
            domain = D::NAME,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            deferred = report.deferred,
            remaining = report.remaining,
            "Replay pass finished"
        );
        self.publish(SyncEvent::ReplayFinished {
            domain: D::NAME,
            report: report.clone(),
        });

        Ok(ReplayOutcome::Completed(report))
    }

    async fn replay_one(&self, op: PendingOperation<D::Command>, report: &mut ReplayReport) {
        let kind = op.command.kind();
        let result = self.inner.remote.execute(&op.command).await;

        if self.is_destroyed() {
            warn!(domain = D::NAME, op_id = %op.id, kind, "Replay result arrived after teardown; ignored");
            return;
        }

        match result {
            Ok(response) => {
                self.inner.queue.lock().await.complete(op.id);
                self.invalidate(&op.command.invalidation()).await;
                report.succeeded += 1;
                if let Some(hook) = self.replay_hook() {
                    hook.applied(self, &op.command, response).await;
                }
                debug!(domain = D::NAME, op_id = %op.id, kind, "Replayed");
                self.publish(SyncEvent::Replayed {
                    domain: D::NAME,
                    op_id: op.id,
                    kind,
                });
            }
            Err(RemoteError::Unreachable(reason)) => {
                // Left in place with no failure recorded; later items are
                // still attempted.
                report.deferred += 1;
                debug!(domain = D::NAME, op_id = %op.id, kind, %reason, "Unreachable during replay, deferred");
            }
            Err(err) => {
                let error = err.to_string();
                let outcome = self
                    .inner
                    .queue
                    .lock()
                    .await
                    .record_failure(op.id, &error, self.now());
                report.failed += 1;

                match outcome {
                    FailureOutcome::Retained { attempts } => {
                        warn!(domain = D::NAME, op_id = %op.id, kind, attempts, %error, "Replay item failed, kept in queue");
                        self.publish(SyncEvent::ReplayFailed {
                            domain: D::NAME,
                            op_id: op.id,
                            kind,
                            attempts,
                            error,
                        });
                    }
                    FailureOutcome::DeadLettered { attempts } => {
                        report.dead_lettered += 1;
                        warn!(domain = D::NAME, op_id = %op.id, kind, attempts, %error, "Replay item dead-lettered");
                        self.publish(SyncEvent::ReplayFailed {
                            domain: D::NAME,
                            op_id: op.id,
                            kind,
                            attempts,
                            error,
                        });
                        self.publish(SyncEvent::DeadLettered {
                            domain: D::NAME,
                            op_id: op.id,
                            kind,
                            attempts,
                        });
                    }
                    FailureOutcome::Unknown => {
                        debug!(domain = D::NAME, op_id = %op.id, "Failed item no longer queued");
                    }
                }
            }
        }
    }

    /// Replay from a background trigger; outcomes are logged, not returned.
    async fn replay_in_background(&self, trigger: &'static str) {
        match self.replay_pending().await {
            Ok(ReplayOutcome::Completed(report)) => {
                debug!(domain = D::NAME, trigger, succeeded = report.succeeded, "Background replay done");
            }
            Ok(outcome) => debug!(domain = D::NAME, trigger, ?outcome, "Background replay skipped"),
            Err(err) => debug!(domain = D::NAME, trigger, error = %err, "Background replay not run"),
        }
    }

    // =========================================================================
    // Queue Inspection
    // =========================================================================

    pub async fn queue_health(&self) -> QueueHealth {
        self.inner.queue.lock().await.health()
    }

    pub async fn pending_operations(&self) -> Vec<PendingOperation<D::Command>> {
        self.inner.queue.lock().await.pending()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter<D::Command>> {
        self.inner.queue.lock().await.dead_letters().to_vec()
    }

    /// Moves dead-lettered operations back into the queue.
    pub async fn requeue_dead_letters(&self) -> SyncResult<usize> {
        self.ensure_live()?;
        let now = self.now();
        let count = self.inner.queue.lock().await.requeue_dead_letters(now);
        if count > 0 {
            info!(domain = D::NAME, count, "Dead letters requeued");
        }
        Ok(count)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the reconnect listener and the replay safety-net timer.
    ///
    /// Idempotent. Must be called inside a tokio runtime.
    pub fn start(&self) -> SyncResult<()> {
        self.ensure_live()?;

        let mut tasks = self
            .inner
            .tasks
            .lock()
            .map_err(|_| SyncError::Internal("engine task lock poisoned".into()))?;
        if tasks.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(&self.inner);
        let reconnect = ListenerTask::watch(
            "sync.reconnect",
            self.inner.reachability.subscribe(),
            move |state| {
                let weak = weak.clone();
                async move {
                    if state.is_online() {
                        if let Some(engine) = Self::upgrade(&weak) {
                            engine.replay_in_background("reconnect").await;
                        }
                    }
                }
            },
        );

        let weak = Arc::downgrade(&self.inner);
        let replay = PeriodicTask::start("sync.replay", self.inner.settings.replay_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(engine) = Self::upgrade(&weak) {
                    engine.replay_in_background("timer").await;
                }
            }
        });

        *tasks = Some(EngineTasks {
            _reconnect: reconnect,
            _replay: replay,
        });
        info!(
            domain = D::NAME,
            replay_interval = ?self.inner.settings.replay_interval,
            "Sync engine started"
        );
        Ok(())
    }

    fn upgrade(weak: &Weak<Inner<D>>) -> Option<Self> {
        weak.upgrade().map(|inner| SyncEngine { inner })
    }

    /// Stops initiating new work. In-flight remote calls are not cancelled.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // Dropping the guards closes their shutdown channels.
        drop(tasks);
        info!(domain = D::NAME, "Sync engine destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::queue::RetryPolicy;
    use crate::reachability::ManualReachability;
    use crate::testing::{t0, AddNote, NoteQuery, Notes, ScriptedRemote};
    use std::time::Duration as StdDuration;

    struct Harness {
        engine: SyncEngine<Notes>,
        remote: Arc<ScriptedRemote<Notes>>,
        clock: Arc<ManualClock>,
        reachability: Arc<ManualReachability>,
    }

    fn harness(remote: ScriptedRemote<Notes>, online: bool, settings: EngineSettings) -> Harness {
        let remote = Arc::new(remote);
        let clock = Arc::new(ManualClock::new(t0()));
        let reachability = Arc::new(ManualReachability::new(online.into()));
        let engine = SyncEngine::new(settings, remote.clone(), clock.clone(), reachability.clone());
        Harness {
            engine,
            remote,
            clock,
            reachability,
        }
    }

    fn note(text: &str) -> AddNote {
        AddNote(text.to_string())
    }

    #[tokio::test]
    async fn test_offline_mutation_is_queued_then_replayed_once() {
        let h = harness(ScriptedRemote::echo(), false, EngineSettings::default());

        let submission = h.engine.enqueue_or_execute(note("fence down")).await.unwrap();
        assert!(submission.is_queued());
        assert_eq!(submission.value(), Some(&vec!["fence down".to_string()]));
        assert_eq!(h.remote.executed().len(), 0);
        assert_eq!(h.engine.pending_operations().await.len(), 1);

        assert_eq!(h.engine.replay_pending().await.unwrap(), ReplayOutcome::Offline);

        h.reachability.go_online();
        let outcome = h.engine.replay_pending().await.unwrap();
        let ReplayOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass, got {:?}", outcome);
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(h.remote.executed(), vec![note("fence down")]);

        assert_eq!(h.engine.replay_pending().await.unwrap(), ReplayOutcome::Idle);
        assert_eq!(h.remote.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_attempts_in_fifo_order_and_skips_past_failures() {
        let remote = ScriptedRemote::echo().failing_on(|cmd: &AddNote| {
            (cmd.0 == "B").then(|| RemoteError::rejected(422, "bad note"))
        });
        let h = harness(remote, false, EngineSettings::default());
        for text in ["A", "B", "C"] {
            h.engine.enqueue_or_execute(note(text)).await.unwrap();
        }

        h.reachability.go_online();
        let ReplayOutcome::Completed(report) = h.engine.replay_pending().await.unwrap() else {
            panic!("expected a completed pass");
        };

        assert_eq!(h.remote.executed(), vec![note("A"), note("B"), note("C")]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        let pending = h.engine.pending_operations().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].command, note("B"));
    }

    #[tokio::test]
    async fn test_unreachable_item_is_deferred_and_pass_continues() {
        let remote = ScriptedRemote::echo().failing_on(|cmd: &AddNote| {
            (cmd.0 == "B").then(|| RemoteError::Unreachable("connection reset".into()))
        });
        let h = harness(remote, false, EngineSettings::default());
        for text in ["A", "B", "C"] {
            h.engine.enqueue_or_execute(note(text)).await.unwrap();
        }

        h.reachability.go_online();
        let ReplayOutcome::Completed(report) = h.engine.replay_pending().await.unwrap() else {
            panic!("expected a completed pass");
        };

        assert_eq!(h.remote.executed(), vec![note("A"), note("B"), note("C")]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 1);
        let pending = h.engine.pending_operations().await;
        assert_eq!(pending[0].command, note("B"));
        assert_eq!(pending[0].attempts, 0);
    }

    #[derive(Default)]
    struct RecordingHook {
        seen: StdMutex<Vec<(AddNote, Vec<String>)>>,
    }

    #[async_trait]
    impl ReplayHook<Notes> for RecordingHook {
        async fn applied(&self, engine: &SyncEngine<Notes>, command: &AddNote, response: Vec<String>) {
            assert!(engine.pending_operations().await.iter().all(|op| &op.command != command));
            self.seen.lock().unwrap().push((command.clone(), response));
        }
    }

    #[tokio::test]
    async fn test_replay_hook_receives_each_applied_response() {
        let remote = ScriptedRemote::echo().failing_on(|cmd: &AddNote| {
            (cmd.0 == "B").then(|| RemoteError::rejected(422, "bad note"))
        });
        let h = harness(remote, false, EngineSettings::default());
        let hook = Arc::new(RecordingHook::default());
        h.engine.set_replay_hook(hook.clone());
        for text in ["A", "B", "C"] {
            h.engine.enqueue_or_execute(note(text)).await.unwrap();
        }

        h.reachability.go_online();
        h.engine.replay_pending().await.unwrap();

        let seen = hook.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (note("A"), vec!["A".to_string()]),
                (note("C"), vec!["C".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_replay_hook_not_called_for_direct_execute() {
        let h = harness(ScriptedRemote::echo(), true, EngineSettings::default());
        let hook = Arc::new(RecordingHook::default());
        h.engine.set_replay_hook(hook.clone());

        let submission = h.engine.enqueue_or_execute(note("direct")).await.unwrap();
        assert!(!submission.is_queued());
        assert!(hook.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_replay_is_rejected_by_guard() {
        let remote = ScriptedRemote::echo().gated();
        let gate = remote.gate();
        let h = harness(remote, false, EngineSettings::default());
        h.engine.enqueue_or_execute(note("only")).await.unwrap();
        h.reachability.go_online();

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.replay_pending().await });
        gate.entered().await;

        assert_eq!(
            h.engine.replay_pending().await.unwrap(),
            ReplayOutcome::AlreadyRunning
        );

        gate.release(1);
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, ReplayOutcome::Completed(ref r) if r.succeeded == 1));
        assert_eq!(h.remote.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_while_online_is_surfaced_not_queued() {
        let remote = ScriptedRemote::echo()
            .failing_on(|_: &AddNote| Some(RemoteError::rejected(409, "duplicate")));
        let h = harness(remote, true, EngineSettings::default());

        let err = h.engine.enqueue_or_execute(note("dup")).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 409, .. }));
        assert!(h.engine.pending_operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_during_execute_is_queued() {
        let remote = ScriptedRemote::echo()
            .failing_on(|_: &AddNote| Some(RemoteError::Unreachable("connection reset".into())));
        let h = harness(remote, true, EngineSettings::default());
        let mut events = h.engine.subscribe_events();

        let submission = h.engine.enqueue_or_execute(note("late")).await.unwrap();
        assert!(submission.is_queued());
        assert_eq!(h.engine.pending_operations().await.len(), 1);
        assert!(matches!(events.recv().await.unwrap(), SyncEvent::Queued { kind: "add_note", .. }));
    }

    #[tokio::test]
    async fn test_reads_are_cached_until_ttl() {
        let h = harness(ScriptedRemote::echo(), true, EngineSettings::default());

        h.engine.read(&NoteQuery::All).await.unwrap();
        h.engine.read(&NoteQuery::All).await.unwrap();
        assert_eq!(h.remote.fetch_count(), 1);

        h.clock.advance(chrono::Duration::seconds(299));
        h.engine.read(&NoteQuery::All).await.unwrap();
        assert_eq!(h.remote.fetch_count(), 1);

        h.clock.advance(chrono::Duration::seconds(1));
        h.engine.read(&NoteQuery::All).await.unwrap();
        assert_eq!(h.remote.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_successful_write_invalidates_cached_read() {
        let h = harness(ScriptedRemote::echo(), true, EngineSettings::default());
        h.engine.read(&NoteQuery::All).await.unwrap();
        h.engine.read(&NoteQuery::Tagged("calving".into())).await.unwrap();
        assert_eq!(h.remote.fetch_count(), 2);

        h.engine.enqueue_or_execute(note("new")).await.unwrap();

        h.engine.read(&NoteQuery::All).await.unwrap();
        h.engine.read(&NoteQuery::Tagged("calving".into())).await.unwrap();
        assert_eq!(h.remote.fetch_count(), 4);
    }

    #[tokio::test]
    async fn test_offline_read_miss_is_surfaced() {
        let h = harness(ScriptedRemote::echo(), false, EngineSettings::default());
        let err = h.engine.read(&NoteQuery::All).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.remote.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_attempts() {
        let remote = ScriptedRemote::echo()
            .failing_on(|_: &AddNote| Some(RemoteError::rejected(400, "malformed")));
        let settings = EngineSettings {
            retry: RetryPolicy {
                max_attempts: Some(2),
                failing_threshold: 1,
                backoff: None,
            },
            ..EngineSettings::default()
        };
        let h = harness(remote, false, settings);
        h.engine.enqueue_or_execute(note("poison")).await.unwrap();
        h.reachability.go_online();

        h.engine.replay_pending().await.unwrap();
        let health = h.engine.queue_health().await;
        assert_eq!((health.pending, health.failing, health.dead_lettered), (1, 1, 0));

        let ReplayOutcome::Completed(report) = h.engine.replay_pending().await.unwrap() else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.dead_lettered, 1);
        let health = h.engine.queue_health().await;
        assert_eq!((health.pending, health.dead_lettered), (0, 1));
        assert_eq!(h.engine.dead_letters().await[0].last_error, "rejected (400): malformed");

        assert_eq!(h.engine.requeue_dead_letters().await.unwrap(), 1);
        assert_eq!(h.engine.pending_operations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_triggers_replay() {
        let h = harness(ScriptedRemote::echo(), false, EngineSettings::default());
        h.engine.enqueue_or_execute(note("queued offline")).await.unwrap();
        let mut events = h.engine.subscribe_events();
        h.engine.start().unwrap();

        h.reachability.go_online();

        let finished = tokio::time::timeout(StdDuration::from_secs(5), async {
            loop {
                if let Ok(SyncEvent::ReplayFinished { report, .. }) = events.recv().await {
                    return report;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(finished.succeeded, 1);
        assert_eq!(h.remote.executed(), vec![note("queued offline")]);
        h.engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_net_timer_replays() {
        let settings = EngineSettings {
            replay_interval: StdDuration::from_secs(30),
            ..EngineSettings::default()
        };
        // First execute drops the connection; the flag stays online, so no
        // reconnect notification ever fires.
        let dropped = std::sync::atomic::AtomicBool::new(false);
        let remote = ScriptedRemote::echo().failing_on(move |_: &AddNote| {
            (!dropped.swap(true, Ordering::SeqCst))
                .then(|| RemoteError::Unreachable("connection reset".into()))
        });
        let h = harness(remote, true, settings);
        let submission = h.engine.enqueue_or_execute(note("missed signal")).await.unwrap();
        assert!(submission.is_queued());
        h.engine.start().unwrap();

        tokio::time::sleep(StdDuration::from_secs(29)).await;
        assert_eq!(h.engine.pending_operations().await.len(), 1);

        tokio::time::sleep(StdDuration::from_secs(2)).await;
        assert!(h.engine.pending_operations().await.is_empty());
        assert_eq!(h.remote.executed().len(), 2);
        h.engine.destroy();
    }

    #[tokio::test]
    async fn test_destroy_refuses_new_work() {
        let h = harness(ScriptedRemote::echo(), true, EngineSettings::default());
        h.engine.start().unwrap();
        h.engine.destroy();
        h.engine.destroy();

        assert!(h.engine.is_destroyed());
        assert!(matches!(
            h.engine.enqueue_or_execute(note("x")).await,
            Err(SyncError::ShuttingDown)
        ));
        assert!(matches!(h.engine.replay_pending().await, Err(SyncError::ShuttingDown)));
        assert!(matches!(h.engine.start(), Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_late_completion_after_destroy_is_ignored() {
        let remote = ScriptedRemote::echo().gated();
        let gate = remote.gate();
        let h = harness(remote, false, EngineSettings::default());
        h.engine.enqueue_or_execute(note("in flight")).await.unwrap();
        h.reachability.go_online();

        let engine = h.engine.clone();
        let pass = tokio::spawn(async move { engine.replay_pending().await });
        gate.entered().await;

        h.engine.destroy();
        gate.release(1);
        let outcome = pass.await.unwrap().unwrap();

        let ReplayOutcome::Completed(report) = outcome else {
            panic!("expected the in-flight pass to finish");
        };
        assert_eq!(report.succeeded, 0);
        assert_eq!(h.engine.pending_operations().await.len(), 1);
    }
}
