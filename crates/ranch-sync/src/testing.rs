//! Test doubles shared by the in-crate test modules.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ranch_core::Alert;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

use crate::cache::Invalidation;
use crate::operation::{Command, Domain, Query, QueuedReceipt};
use crate::remote::{AlertStore, Remote, RemoteError, RemoteResult};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
}

// =============================================================================
// Scripted Remote
// =============================================================================

type ExecuteFn<D> =
    Box<dyn Fn(&<D as Domain>::Command) -> RemoteResult<<D as Domain>::Response> + Send + Sync>;
type FetchFn<D> =
    Box<dyn Fn(&<D as Domain>::Query) -> RemoteResult<<D as Domain>::Response> + Send + Sync>;
type FailFn<D> = Box<dyn Fn(&<D as Domain>::Command) -> Option<RemoteError> + Send + Sync>;

/// Holds `execute` calls until released, and signals when one arrives.
#[derive(Debug)]
pub struct Gate {
    permits: Semaphore,
    entered: Notify,
}

impl Default for Gate {
    fn default() -> Self {
        Gate {
            permits: Semaphore::new(0),
            entered: Notify::new(),
        }
    }
}

impl Gate {
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self, calls: usize) {
        self.permits.add_permits(calls);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// A remote answering from closures and recording every execute call.
pub struct ScriptedRemote<D: Domain> {
    execute: ExecuteFn<D>,
    fetch: FetchFn<D>,
    failures: Option<FailFn<D>>,
    executed: Mutex<Vec<D::Command>>,
    fetches: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl<D: Domain> ScriptedRemote<D> {
    pub fn new(
        execute: impl Fn(&D::Command) -> RemoteResult<D::Response> + Send + Sync + 'static,
        fetch: impl Fn(&D::Query) -> RemoteResult<D::Response> + Send + Sync + 'static,
    ) -> Self {
        ScriptedRemote {
            execute: Box::new(execute),
            fetch: Box::new(fetch),
            failures: None,
            executed: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Fails executes for which `fail` returns an error. The call is still
    /// recorded.
    pub fn failing_on(
        mut self,
        fail: impl Fn(&D::Command) -> Option<RemoteError> + Send + Sync + 'static,
    ) -> Self {
        self.failures = Some(Box::new(fail));
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Gate::default()));
        self
    }

    pub fn gate(&self) -> Arc<Gate> {
        self.gate.clone().expect("remote was not built with gated()")
    }

    pub fn executed(&self) -> Vec<D::Command> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<D: Domain> Remote<D> for ScriptedRemote<D> {
    async fn execute(&self, command: &D::Command) -> RemoteResult<D::Response> {
        self.executed.lock().unwrap().push(command.clone());
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(err) = self.failures.as_ref().and_then(|fail| fail(command)) {
            return Err(err);
        }
        (self.execute)(command)
    }

    async fn fetch(&self, query: &D::Query) -> RemoteResult<D::Response> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        (self.fetch)(query)
    }
}

// =============================================================================
// Recording Alert Store
// =============================================================================

#[derive(Debug, Default)]
pub struct RecordingAlertStore {
    persisted: Mutex<Vec<Alert>>,
    fail: AtomicBool,
}

impl RecordingAlertStore {
    pub fn persisted(&self) -> Vec<Alert> {
        self.persisted.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertStore for RecordingAlertStore {
    async fn persist(&self, alert: &Alert) -> RemoteResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("alert store offline".into()));
        }
        self.persisted.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

// =============================================================================
// Notes Domain
// =============================================================================

/// Minimal domain for exercising the engine without domain payloads.
pub struct Notes;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddNote(pub String);

impl Command for AddNote {
    fn kind(&self) -> &'static str {
        "add_note"
    }

    fn invalidation(&self) -> Invalidation {
        Invalidation::endpoint("notes")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NoteQuery {
    All,
    Tagged(String),
}

impl Query for NoteQuery {
    fn endpoint(&self) -> String {
        "notes".to_string()
    }
}

impl Domain for Notes {
    const NAME: &'static str = "notes";
    type Command = AddNote;
    type Query = NoteQuery;
    type Response = Vec<String>;

    fn placeholder(command: &AddNote, _receipt: &QueuedReceipt) -> Option<Vec<String>> {
        Some(vec![command.0.clone()])
    }
}

impl ScriptedRemote<Notes> {
    /// Executes echo the note back; fetches return an empty list.
    pub fn echo() -> Self {
        Self::new(
            |cmd: &AddNote| Ok(vec![cmd.0.clone()]),
            |_: &NoteQuery| Ok(Vec::new()),
        )
    }
}
