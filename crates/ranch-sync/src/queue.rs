//! # Pending Operation Queue
//!
//! FIFO list of mutations attempted while the server was unreachable.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pending Operation Lifecycle                          │
//! │                                                                         │
//! │  enqueue(cmd) ──► [op-1][op-2][op-3] ◄── snapshot(now) for a replay     │
//! │                        │                                                │
//! │           ┌────────────┼─────────────────────┐                         │
//! │           ▼            ▼                     ▼                          │
//! │      complete(id)  record_failure(id)   (unreachable: untouched)        │
//! │      removed       attempts += 1                                        │
//! │                        │                                                │
//! │                        ├── attempts < max_attempts ──► stays queued     │
//! │                        └── attempts = max_attempts ──► dead letters     │
//! │                                                                         │
//! │  Defaults: max_attempts unlimited, no backoff. A poison operation is    │
//! │  retried on every trigger until someone sets a limit.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations are never mutated in place. Attempt bookkeeping lives next to
//! the queue, keyed by [`OpId`].

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Operation Id
// =============================================================================

/// Monotonic id of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl OpId {
    pub const fn new(raw: u64) -> Self {
        OpId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

// =============================================================================
// Pending Operation
// =============================================================================

/// A queued mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation<C> {
    pub id: OpId,
    pub command: C,
    pub enqueued_at: DateTime<Utc>,
}

/// Replay history for one queued operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptRecord {
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set when backoff is enabled; the item is skipped until then.
    pub next_eligible_at: Option<DateTime<Utc>>,
}

/// An operation that exhausted its attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter<C> {
    pub operation: PendingOperation<C>,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// What happened to an item after a failed replay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retained { attempts: u32 },
    DeadLettered { attempts: u32 },
    /// The id was not in the queue.
    Unknown,
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Exponential delay between replay attempts of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `attempts`-th consecutive failure.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial,
            initial_interval: self.initial,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        let mut delay = self.initial;
        for _ in 0..attempts.max(1) {
            delay = backoff.next_backoff().unwrap_or(self.max);
        }
        delay.min(self.max)
    }
}

/// Replay policy knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Attempts after which an item counts as failing in [`QueueHealth`].
    pub failing_threshold: u32,
    /// `None` retries on every trigger.
    pub backoff: Option<BackoffPolicy>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: None,
            failing_threshold: 3,
            backoff: None,
        }
    }
}

// =============================================================================
// Queue Health
// =============================================================================

/// Summary of queue state for a health indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueHealth {
    pub pending: usize,
    /// Pending items at or past the failing threshold.
    pub failing: usize,
    pub dead_lettered: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl QueueHealth {
    pub fn is_healthy(&self) -> bool {
        self.failing == 0 && self.dead_lettered == 0
    }
}

// =============================================================================
// Pending Queue
// =============================================================================

/// FIFO queue of pending operations with attempt bookkeeping.
#[derive(Debug)]
pub struct PendingQueue<C> {
    items: VecDeque<PendingOperation<C>>,
    attempts: HashMap<OpId, AttemptRecord>,
    dead_letters: Vec<DeadLetter<C>>,
    next_id: u64,
    policy: RetryPolicy,
}

impl<C: Clone> PendingQueue<C> {
    pub fn new(policy: RetryPolicy) -> Self {
        PendingQueue {
            items: VecDeque::new(),
            attempts: HashMap::new(),
            dead_letters: Vec::new(),
            next_id: 1,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Appends a command and returns its id.
    pub fn enqueue(&mut self, command: C, now: DateTime<Utc>) -> OpId {
        let id = OpId(self.next_id);
        self.next_id += 1;
        self.items.push_back(PendingOperation {
            id,
            command,
            enqueued_at: now,
        });
        id
    }

    /// Items eligible for a replay pass, in FIFO order.
    ///
    /// A copy: enqueues made while the pass runs wait for the next one.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<PendingOperation<C>> {
        self.items
            .iter()
            .filter(|op| self.is_eligible(op.id, now))
            .cloned()
            .collect()
    }

    fn is_eligible(&self, id: OpId, now: DateTime<Utc>) -> bool {
        self.attempts
            .get(&id)
            .and_then(|record| record.next_eligible_at)
            .map(|eligible_at| now >= eligible_at)
            .unwrap_or(true)
    }

    /// All pending items in FIFO order, eligible or not.
    pub fn pending(&self) -> Vec<PendingOperation<C>> {
        self.items.iter().cloned().collect()
    }

    /// Removes a successfully replayed item.
    pub fn complete(&mut self, id: OpId) -> bool {
        let Some(position) = self.items.iter().position(|op| op.id == id) else {
            return false;
        };
        self.items.remove(position);
        self.attempts.remove(&id);
        true
    }

    /// Records a failed replay attempt and applies the retry policy.
    pub fn record_failure(&mut self, id: OpId, error: &str, now: DateTime<Utc>) -> FailureOutcome {
        let Some(position) = self.items.iter().position(|op| op.id == id) else {
            return FailureOutcome::Unknown;
        };

        let record = self.attempts.entry(id).or_default();
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        record.last_attempt_at = Some(now);
        let attempts = record.attempts;

        if let Some(max) = self.policy.max_attempts {
            if attempts >= max {
                self.attempts.remove(&id);
                if let Some(operation) = self.items.remove(position) {
                    self.dead_letters.push(DeadLetter {
                        operation,
                        attempts,
                        last_error: error.to_string(),
                        dead_lettered_at: now,
                    });
                }
                return FailureOutcome::DeadLettered { attempts };
            }
        }

        if let Some(backoff) = &self.policy.backoff {
            let delay = backoff.delay_after(attempts);
            record.next_eligible_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| now + delay);
        }

        FailureOutcome::Retained { attempts }
    }

    pub fn attempts(&self, id: OpId) -> Option<&AttemptRecord> {
        self.attempts.get(&id)
    }

    pub fn dead_letters(&self) -> &[DeadLetter<C>] {
        &self.dead_letters
    }

    /// Moves every dead letter back to the tail of the queue with a fresh id
    /// and a clean attempt history. Returns how many were moved.
    pub fn requeue_dead_letters(&mut self, now: DateTime<Utc>) -> usize {
        let letters = std::mem::take(&mut self.dead_letters);
        let count = letters.len();
        for letter in letters {
            self.enqueue(letter.operation.command, now);
        }
        count
    }

    pub fn health(&self) -> QueueHealth {
        let threshold = self.policy.failing_threshold.max(1);
        QueueHealth {
            pending: self.items.len(),
            failing: self
                .attempts
                .values()
                .filter(|record| record.attempts >= threshold)
                .count(),
            dead_lettered: self.dead_letters.len(),
            oldest_enqueued_at: self.items.front().map(|op| op.enqueued_at),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
