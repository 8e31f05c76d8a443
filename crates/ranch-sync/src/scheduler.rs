//! # Scheduler
//!
//! Background tasks owned by a guard value: the task runs while the guard
//! lives and is told to stop when the guard is stopped or dropped.
//!
//! ## Task Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PeriodicTask::start(name, period, f)                                   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌───────────────────────────────────────────┐                         │
//! │  │ loop {                                    │                         │
//! │  │   select! {                               │                         │
//! │  │     shutdown_rx.recv() => break,          │◄── stop() / Drop        │
//! │  │     ticker.tick()      => f().await,      │    closes the channel   │
//! │  │   }                                       │                         │
//! │  │ }                                         │                         │
//! │  └───────────────────────────────────────────┘                         │
//! │                                                                         │
//! │  Stopping never aborts a callback that is already running: the loop    │
//! │  finishes the current tick and then sees the closed channel.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ticks never overlap. A callback that outlasts the period delays the next
//! tick instead of queuing a burst ([`MissedTickBehavior::Delay`]).

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Smallest accepted period; tokio panics on a zero interval.
const MIN_PERIOD: Duration = Duration::from_millis(1);

// =============================================================================
// Task Guard
// =============================================================================

#[derive(Debug)]
struct TaskGuard {
    name: &'static str,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    fn stop(&mut self) {
        if self.shutdown_tx.take().is_some() {
            debug!(task = self.name, "Stopping background task");
        }
    }

    fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
            && self
                .handle
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
    }

    async fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Periodic Task
// =============================================================================

/// Runs a callback every `period` until stopped.
#[derive(Debug)]
pub struct PeriodicTask {
    guard: TaskGuard,
}

impl PeriodicTask {
    /// Spawns the task. The first tick fires one `period` after start.
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            debug!(task = name, ?period, "Periodic task started");
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            debug!(task = name, "Periodic task stopped");
        });

        PeriodicTask {
            guard: TaskGuard {
                name,
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.guard.name
    }

    /// Signals the task to stop after any tick in progress.
    pub fn stop(&mut self) {
        self.guard.stop();
    }

    /// Stops the task and waits for the loop to exit.
    pub async fn join(mut self) {
        self.guard.join().await;
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }
}

// =============================================================================
// Listener Task
// =============================================================================

/// Runs a callback for every change published on a watch channel.
#[derive(Debug)]
pub struct ListenerTask {
    guard: TaskGuard,
}

impl ListenerTask {
    /// Spawns the listener. The value current at subscription time is not
    /// delivered, only later changes.
    pub fn watch<T, F, Fut>(name: &'static str, mut rx: watch::Receiver<T>, mut on_change: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            debug!(task = name, "Listener started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            debug!(task = name, "Signal source dropped");
                            break;
                        }
                        let value = rx.borrow_and_update().clone();
                        on_change(value).await;
                    }
                }
            }
            debug!(task = name, "Listener stopped");
        });

        ListenerTask {
            guard: TaskGuard {
                name,
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            },
        }
    }

    pub fn stop(&mut self) {
        self.guard.stop();
    }

    pub async fn join(mut self) {
        self.guard.join().await;
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut task = PeriodicTask::start("test.tick", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(task.is_running());

        task.stop();
        assert!(!task.is_running());
        task.join().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = PeriodicTask::start("test.drop", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        drop(task);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listener_sees_changes_only() {
        let (tx, rx) = watch::channel(0u32);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let listener = ListenerTask::watch("test.watch", rx, move |value| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(value);
            }
        });

        tx.send(7).unwrap();
        assert_eq!(seen_rx.recv().await, Some(7));
        tx.send(9).unwrap();
        assert_eq!(seen_rx.recv().await, Some(9));

        listener.join().await;
        let _ = tx.send(11);
        assert!(seen_rx.try_recv().is_err());
    }
}
