//! # Bovines Facade
//!
//! Herd records and weighings. A weighing the server applies comes back as a
//! [`WeightTrend`], which feeds the rapid weight loss rule straight away. A
//! weighing queued offline gets the same check when it replays. There is no
//! periodic scan for this domain.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use ranch_core::catalog::bovines as rules;
use ranch_core::validation::{validate_name, validate_new_bovine, validate_weight};
use ranch_core::{
    Bovine, BovinePatch, BovineStatus, NewBovine, RuleSet, WeightRecord, WeightTrend,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{local_id, unexpected};
use crate::alerts::AlertRegistry;
use crate::cache::Invalidation;
use crate::engine::{ReplayHook, SyncEngine};
use crate::error::SyncResult;
use crate::evaluator::RuleEvaluator;
use crate::operation::{Command, Domain, Query, QueuedReceipt, Submission};

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug)]
pub struct Bovines;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BovineCommand {
    Register(NewBovine),
    Update { id: String, patch: BovinePatch },
    Remove { id: String },
    RecordWeight(WeightRecord),
}

impl Command for BovineCommand {
    fn kind(&self) -> &'static str {
        match self {
            BovineCommand::Register(_) => "register_bovine",
            BovineCommand::Update { .. } => "update_bovine",
            BovineCommand::Remove { .. } => "remove_bovine",
            BovineCommand::RecordWeight(_) => "record_weight",
        }
    }

    fn invalidation(&self) -> Invalidation {
        Invalidation::endpoint("bovines")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BovineQuery {
    List { status: Option<BovineStatus> },
    Get { id: String },
}

impl Query for BovineQuery {
    fn endpoint(&self) -> String {
        match self {
            BovineQuery::List { .. } => "bovines".to_string(),
            BovineQuery::Get { id } => format!("bovines/{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BovineResponse {
    Bovines(Vec<Bovine>),
    Bovine(Bovine),
    Weighed(WeightTrend),
    Removed { id: String },
}

impl BovineResponse {
    pub fn into_bovines(self) -> SyncResult<Vec<Bovine>> {
        match self {
            BovineResponse::Bovines(bovines) => Ok(bovines),
            other => Err(unexpected("Bovines", &other)),
        }
    }

    pub fn into_bovine(self) -> SyncResult<Bovine> {
        match self {
            BovineResponse::Bovine(bovine) => Ok(bovine),
            other => Err(unexpected("Bovine", &other)),
        }
    }

    pub fn into_trend(self) -> SyncResult<WeightTrend> {
        match self {
            BovineResponse::Weighed(trend) => Ok(trend),
            other => Err(unexpected("Weighed", &other)),
        }
    }
}

impl Domain for Bovines {
    const NAME: &'static str = "bovines";
    type Command = BovineCommand;
    type Query = BovineQuery;
    type Response = BovineResponse;

    fn placeholder(command: &BovineCommand, receipt: &QueuedReceipt) -> Option<BovineResponse> {
        match command {
            BovineCommand::Register(new) => Some(BovineResponse::Bovine(
                new.clone().into_local(local_id(), receipt.enqueued_at),
            )),
            BovineCommand::Remove { id } => Some(BovineResponse::Removed { id: id.clone() }),
            // The previous weight lives on the server.
            BovineCommand::Update { .. } | BovineCommand::RecordWeight(_) => None,
        }
    }
}

// =============================================================================
// Replayed Weighings
// =============================================================================

/// Runs the weight loss rule on weighings applied during replay.
struct ReplayedWeighings(RuleEvaluator<WeightTrend>);

#[async_trait]
impl ReplayHook<Bovines> for ReplayedWeighings {
    async fn applied(&self, _engine: &SyncEngine<Bovines>, _command: &BovineCommand, response: BovineResponse) {
        if let BovineResponse::Weighed(trend) = response {
            self.0.evaluate(trend).await;
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

pub struct BovinesFacade {
    engine: SyncEngine<Bovines>,
    evaluator: RuleEvaluator<WeightTrend>,
}

impl BovinesFacade {
    pub fn new(engine: SyncEngine<Bovines>, registry: AlertRegistry, rule_interval: Duration) -> Self {
        let evaluator = RuleEvaluator::new(
            RuleSet::new().with(rules::rapid_weight_loss(rule_interval)),
            registry,
            engine.clock(),
        );
        engine.set_replay_hook(Arc::new(ReplayedWeighings(evaluator.clone())));
        BovinesFacade { engine, evaluator }
    }

    pub fn engine(&self) -> &SyncEngine<Bovines> {
        &self.engine
    }

    pub fn registry(&self) -> &AlertRegistry {
        self.evaluator.registry()
    }

    pub async fn list_bovines(&self, status: Option<BovineStatus>) -> SyncResult<Vec<Bovine>> {
        self.engine
            .read(&BovineQuery::List { status })
            .await?
            .into_bovines()
    }

    pub async fn get_bovine(&self, id: &str) -> SyncResult<Bovine> {
        self.engine
            .read(&BovineQuery::Get { id: id.to_string() })
            .await?
            .into_bovine()
    }

    /// Fetches several animals concurrently. Fails on the first error.
    pub async fn get_bovines(&self, ids: &[&str]) -> SyncResult<Vec<Bovine>> {
        try_join_all(ids.iter().map(|id| self.get_bovine(id))).await
    }

    pub async fn register_bovine(&self, new: NewBovine) -> SyncResult<Submission<Bovine>> {
        validate_new_bovine(&new)?;
        self.engine
            .enqueue_or_execute(BovineCommand::Register(new))
            .await?
            .try_map(BovineResponse::into_bovine)
    }

    pub async fn update_bovine(&self, id: &str, patch: BovinePatch) -> SyncResult<Submission<Bovine>> {
        if let Some(breed) = &patch.breed {
            validate_name("breed", breed)?;
        }
        self.engine
            .enqueue_or_execute(BovineCommand::Update {
                id: id.to_string(),
                patch,
            })
            .await?
            .try_map(BovineResponse::into_bovine)
    }

    pub async fn remove_bovine(&self, id: &str) -> SyncResult<Submission<()>> {
        let submission = self
            .engine
            .enqueue_or_execute(BovineCommand::Remove { id: id.to_string() })
            .await?;
        Ok(submission.map(|_| ()))
    }

    /// Records a weighing and checks the loss against the previous one.
    pub async fn record_weight(&self, record: WeightRecord) -> SyncResult<Submission<WeightTrend>> {
        validate_name("bovine_id", &record.bovine_id)?;
        validate_weight(record.weight_kg)?;
        let submission = self
            .engine
            .enqueue_or_execute(BovineCommand::RecordWeight(record))
            .await?
            .try_map(BovineResponse::into_trend)?;

        if let Submission::Applied(trend) = &submission {
            self.evaluator.evaluate(trend.clone()).await;
        }
        Ok(submission)
    }

    pub fn start(&self) -> SyncResult<()> {
        self.engine.start()
    }

    pub fn destroy(&self) {
        self.engine.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{EngineSettings, ReplayOutcome};
    use crate::error::SyncError;
    use crate::reachability::ManualReachability;
    use crate::remote::RemoteError;
    use crate::testing::{t0, ScriptedRemote};
    use chrono::NaiveDate;
    use ranch_core::catalog::bovines::RAPID_WEIGHT_LOSS;
    use ranch_core::{Severity, Sex, SubjectKey};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Herd = Arc<Mutex<HashMap<String, Bovine>>>;

    fn bovine(id: &str, weight_kg: f64) -> Bovine {
        NewBovine {
            ear_tag: format!("RX-{}", id),
            name: None,
            breed: "Hereford".to_string(),
            sex: Sex::Female,
            birth_date: None,
            weight_kg: Some(weight_kg),
        }
        .into_local(id.to_string(), t0())
    }

    fn remote(herd: Herd) -> ScriptedRemote<Bovines> {
        let reads = herd.clone();
        ScriptedRemote::new(
            move |cmd: &BovineCommand| {
                let mut herd = herd.lock().unwrap();
                match cmd {
                    BovineCommand::Register(new) => {
                        let id = format!("b-{}", herd.len() + 1);
                        let created = new.clone().into_local(id.clone(), t0());
                        herd.insert(id, created.clone());
                        Ok(BovineResponse::Bovine(created))
                    }
                    BovineCommand::RecordWeight(record) => {
                        let animal = herd
                            .get_mut(&record.bovine_id)
                            .ok_or_else(|| RemoteError::rejected(404, "no such bovine"))?;
                        let previous_kg = animal.weight_kg.replace(record.weight_kg);
                        Ok(BovineResponse::Weighed(WeightTrend {
                            bovine_id: animal.id.clone(),
                            ear_tag: animal.ear_tag.clone(),
                            previous_kg,
                            current_kg: record.weight_kg,
                        }))
                    }
                    BovineCommand::Update { id, patch } => {
                        let animal = herd
                            .get_mut(id)
                            .ok_or_else(|| RemoteError::rejected(404, "no such bovine"))?;
                        if let Some(status) = patch.status {
                            animal.status = status;
                        }
                        Ok(BovineResponse::Bovine(animal.clone()))
                    }
                    BovineCommand::Remove { id } => {
                        herd.remove(id);
                        Ok(BovineResponse::Removed { id: id.clone() })
                    }
                }
            },
            move |query: &BovineQuery| {
                let herd = reads.lock().unwrap();
                match query {
                    BovineQuery::List { status } => {
                        let mut all: Vec<Bovine> = herd
                            .values()
                            .filter(|b| status.map_or(true, |s| b.status == s))
                            .cloned()
                            .collect();
                        all.sort_by(|a, b| a.id.cmp(&b.id));
                        Ok(BovineResponse::Bovines(all))
                    }
                    BovineQuery::Get { id } => herd
                        .get(id)
                        .cloned()
                        .map(BovineResponse::Bovine)
                        .ok_or_else(|| RemoteError::rejected(404, "no such bovine")),
                }
            },
        )
    }

    fn facade(herd: Vec<Bovine>, online: bool) -> (BovinesFacade, Arc<ScriptedRemote<Bovines>>) {
        let (facade, remote, _) = facade_with_reachability(herd, online);
        (facade, remote)
    }

    fn facade_with_reachability(
        herd: Vec<Bovine>,
        online: bool,
    ) -> (BovinesFacade, Arc<ScriptedRemote<Bovines>>, Arc<ManualReachability>) {
        let herd: Herd = Arc::new(Mutex::new(
            herd.into_iter().map(|b| (b.id.clone(), b)).collect(),
        ));
        let remote = Arc::new(remote(herd));
        let clock = Arc::new(ManualClock::new(t0()));
        let reachability = Arc::new(ManualReachability::new(online.into()));
        let engine = SyncEngine::new(
            EngineSettings::default(),
            remote.clone(),
            clock.clone(),
            reachability.clone(),
        );
        let facade = BovinesFacade::new(engine, AlertRegistry::new(clock), Duration::from_secs(300));
        (facade, remote, reachability)
    }

    fn weighing(bovine_id: &str, weight_kg: f64) -> WeightRecord {
        WeightRecord {
            bovine_id: bovine_id.to_string(),
            weight_kg,
            recorded_on: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_weight_loss_raises_alert() {
        let (facade, _) = facade(vec![bovine("b-1", 400.0)], true);
        let trend = facade
            .record_weight(weighing("b-1", 340.0))
            .await
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(trend.previous_kg, Some(400.0));

        let subject = SubjectKey::new("bovine", "b-1", "rapid-weight-loss");
        let alert = facade.registry().active_for(&subject).await.unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.rule_id, RAPID_WEIGHT_LOSS);
    }

    #[tokio::test]
    async fn test_weight_gain_raises_nothing() {
        let (facade, _) = facade(vec![bovine("b-1", 400.0)], true);
        facade.record_weight(weighing("b-1", 412.0)).await.unwrap();
        assert!(facade.registry().active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_registration_returns_local_record() {
        let (facade, remote) = facade(Vec::new(), false);
        let submission = facade
            .register_bovine(NewBovine {
                ear_tag: "RX-200".to_string(),
                name: Some("Daisy".to_string()),
                breed: "Angus".to_string(),
                sex: Sex::Female,
                birth_date: None,
                weight_kg: Some(310.0),
            })
            .await
            .unwrap();

        assert!(submission.is_queued());
        let local = submission.value().unwrap();
        assert!(local.id.starts_with("local-"));
        assert_eq!(local.status, BovineStatus::Active);
        assert!(remote.executed().is_empty());
        assert_eq!(facade.engine().queue_health().await.pending, 1);
    }

    #[tokio::test]
    async fn test_offline_weighing_has_no_placeholder_or_alert() {
        let (facade, _) = facade(vec![bovine("b-1", 400.0)], false);
        let submission = facade.record_weight(weighing("b-1", 300.0)).await.unwrap();
        assert!(submission.is_queued());
        assert!(submission.value().is_none());
        assert!(facade.registry().active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_replayed_weighing_raises_weight_loss_alert() {
        let (facade, remote, reachability) = facade_with_reachability(vec![bovine("b-1", 400.0)], false);
        facade.record_weight(weighing("b-1", 280.0)).await.unwrap();

        reachability.go_online();
        let ReplayOutcome::Completed(report) = facade.engine().replay_pending().await.unwrap() else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(remote.executed(), vec![BovineCommand::RecordWeight(weighing("b-1", 280.0))]);

        let subject = SubjectKey::new("bovine", "b-1", "rapid-weight-loss");
        let alert = facade.registry().active_for(&subject).await.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_reads() {
        let (facade, remote) = facade(vec![bovine("b-1", 400.0), bovine("b-2", 380.0)], true);
        assert_eq!(facade.list_bovines(Some(BovineStatus::Active)).await.unwrap().len(), 2);
        assert_eq!(facade.list_bovines(Some(BovineStatus::Active)).await.unwrap().len(), 2);
        assert_eq!(remote.fetch_count(), 1);

        facade
            .update_bovine(
                "b-2",
                BovinePatch {
                    status: Some(BovineStatus::Quarantined),
                    ..BovinePatch::default()
                },
            )
            .await
            .unwrap();

        let active = facade.list_bovines(Some(BovineStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(remote.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_get_bovines_fetches_each() {
        let (facade, _) = facade(vec![bovine("b-1", 400.0), bovine("b-2", 380.0)], true);
        let found = facade.get_bovines(&["b-2", "b-1"]).await.unwrap();
        assert_eq!(found.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), ["b-2", "b-1"]);

        let err = facade.get_bovines(&["b-1", "b-9"]).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_weight_rejected_before_engine() {
        let (facade, remote) = facade(vec![bovine("b-1", 400.0)], true);
        let err = facade.record_weight(weighing("b-1", -3.0)).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(remote.executed().is_empty());
    }
}
