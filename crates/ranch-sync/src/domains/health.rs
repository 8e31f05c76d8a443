//! # Health Facade
//!
//! Health checks, vaccinations and quarantines.
//!
//! A recorded check runs the vital-signs rule eagerly for that animal,
//! whether it was applied at once or replayed after an outage. Overdue
//! vaccinations and quarantine violations only show up in server
//! aggregates, so they are covered by the periodic scan. Administering a
//! vaccination resolves its overdue alert.

use async_trait::async_trait;
use futures_util::future::try_join;
use ranch_core::catalog::health as rules;
use ranch_core::validation::{validate_name, validate_new_health_check, validate_new_vaccination};
use ranch_core::{
    HealthCheck, NewHealthCheck, NewVaccination, Quarantine, RuleSet, SubjectKey, Vaccination,
    VaccinationDose,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{local_id, unexpected, ScanSchedule};
use crate::alerts::AlertRegistry;
use crate::cache::Invalidation;
use crate::engine::{ReplayHook, SyncEngine};
use crate::error::SyncResult;
use crate::evaluator::{RuleEvaluator, ScanSummary};
use crate::operation::{Command, Domain, Query, QueuedReceipt, Submission};

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug)]
pub struct Health;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HealthCommand {
    RecordCheck(NewHealthCheck),
    ScheduleVaccination(NewVaccination),
    RecordVaccination(VaccinationDose),
}

impl Command for HealthCommand {
    fn kind(&self) -> &'static str {
        match self {
            HealthCommand::RecordCheck(_) => "record_health_check",
            HealthCommand::ScheduleVaccination(_) => "schedule_vaccination",
            HealthCommand::RecordVaccination(_) => "record_vaccination",
        }
    }

    fn invalidation(&self) -> Invalidation {
        match self {
            HealthCommand::RecordCheck(_) => Invalidation::endpoint("health/records"),
            HealthCommand::ScheduleVaccination(_) | HealthCommand::RecordVaccination(_) => {
                Invalidation::endpoint("health/vaccinations")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HealthQuery {
    Records { bovine_id: Option<String> },
    Vaccinations { bovine_id: Option<String> },
    OverdueVaccinations,
    ActiveQuarantines,
}

impl Query for HealthQuery {
    fn endpoint(&self) -> String {
        match self {
            HealthQuery::Records { .. } => "health/records",
            HealthQuery::Vaccinations { .. } => "health/vaccinations",
            HealthQuery::OverdueVaccinations => "health/vaccinations/overdue",
            HealthQuery::ActiveQuarantines => "health/quarantines/active",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthResponse {
    Records(Vec<HealthCheck>),
    Record(HealthCheck),
    Vaccinations(Vec<Vaccination>),
    Vaccination(Vaccination),
    Quarantines(Vec<Quarantine>),
}

impl HealthResponse {
    pub fn into_records(self) -> SyncResult<Vec<HealthCheck>> {
        match self {
            HealthResponse::Records(records) => Ok(records),
            other => Err(unexpected("Records", &other)),
        }
    }

    pub fn into_record(self) -> SyncResult<HealthCheck> {
        match self {
            HealthResponse::Record(record) => Ok(record),
            other => Err(unexpected("Record", &other)),
        }
    }

    pub fn into_vaccinations(self) -> SyncResult<Vec<Vaccination>> {
        match self {
            HealthResponse::Vaccinations(vaccinations) => Ok(vaccinations),
            other => Err(unexpected("Vaccinations", &other)),
        }
    }

    pub fn into_vaccination(self) -> SyncResult<Vaccination> {
        match self {
            HealthResponse::Vaccination(vaccination) => Ok(vaccination),
            other => Err(unexpected("Vaccination", &other)),
        }
    }

    pub fn into_quarantines(self) -> SyncResult<Vec<Quarantine>> {
        match self {
            HealthResponse::Quarantines(quarantines) => Ok(quarantines),
            other => Err(unexpected("Quarantines", &other)),
        }
    }
}

impl Domain for Health {
    const NAME: &'static str = "health";
    type Command = HealthCommand;
    type Query = HealthQuery;
    type Response = HealthResponse;

    fn placeholder(command: &HealthCommand, receipt: &QueuedReceipt) -> Option<HealthResponse> {
        match command {
            HealthCommand::RecordCheck(new) => Some(HealthResponse::Record(
                new.clone().into_local(local_id(), receipt.enqueued_at),
            )),
            HealthCommand::ScheduleVaccination(new) => Some(HealthResponse::Vaccination(Vaccination {
                id: local_id(),
                bovine_id: new.bovine_id.clone(),
                vaccine: new.vaccine.clone(),
                due_on: new.due_on,
                administered_on: None,
            })),
            HealthCommand::RecordVaccination(_) => None,
        }
    }
}

// =============================================================================
// Eager Rules
// =============================================================================

/// Work done once a health mutation reaches the server.
#[derive(Clone)]
struct EagerRules {
    vitals: RuleEvaluator<HealthCheck>,
}

impl EagerRules {
    async fn check_recorded(&self, check: HealthCheck) {
        self.vitals.evaluate(check).await;
    }

    async fn dose_recorded(&self, vaccination: &Vaccination) -> SyncResult<()> {
        let subject = SubjectKey::new("vaccination", &vaccination.id, "overdue");
        let notes = match vaccination.administered_on {
            Some(on) => format!("Administered on {}", on),
            None => "Administered".to_string(),
        };
        if let Some(alert) = self.vitals.registry().resolve_subject(&subject, notes).await? {
            debug!(alert_id = %alert.id, %subject, "Overdue alert resolved by dose");
        }
        Ok(())
    }
}

#[async_trait]
impl ReplayHook<Health> for EagerRules {
    async fn applied(&self, _engine: &SyncEngine<Health>, command: &HealthCommand, response: HealthResponse) {
        match (command, response) {
            (HealthCommand::RecordCheck(_), HealthResponse::Record(check)) => self.check_recorded(check).await,
            (HealthCommand::RecordVaccination(_), HealthResponse::Vaccination(vaccination)) => {
                if let Err(err) = self.dose_recorded(&vaccination).await {
                    warn!(vaccination_id = %vaccination.id, error = %err, "Replayed dose left overdue alert open");
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

pub struct HealthFacade {
    engine: SyncEngine<Health>,
    eager: EagerRules,
    vaccinations: RuleEvaluator<Vaccination>,
    quarantines: RuleEvaluator<Quarantine>,
    scan_interval: Duration,
    schedule: ScanSchedule,
}

impl HealthFacade {
    pub fn new(engine: SyncEngine<Health>, registry: AlertRegistry, scan_interval: Duration) -> Self {
        let clock = engine.clock();
        let eager = EagerRules {
            vitals: RuleEvaluator::new(
                RuleSet::new().with(rules::vital_signs(scan_interval)),
                registry.clone(),
                clock.clone(),
            ),
        };
        engine.set_replay_hook(Arc::new(eager.clone()));
        HealthFacade {
            eager,
            vaccinations: RuleEvaluator::new(
                RuleSet::new().with(rules::vaccination_overdue(scan_interval)),
                registry.clone(),
                clock.clone(),
            ),
            quarantines: RuleEvaluator::new(
                RuleSet::new().with(rules::quarantine_violation(scan_interval)),
                registry,
                clock,
            ),
            engine,
            scan_interval,
            schedule: ScanSchedule::default(),
        }
    }

    pub fn engine(&self) -> &SyncEngine<Health> {
        &self.engine
    }

    pub fn registry(&self) -> &AlertRegistry {
        self.eager.vitals.registry()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Health checks, for one animal or the whole herd.
    pub async fn list_health_records(&self, bovine_id: Option<&str>) -> SyncResult<Vec<HealthCheck>> {
        let query = HealthQuery::Records {
            bovine_id: bovine_id.map(str::to_string),
        };
        self.engine.read(&query).await?.into_records()
    }

    pub async fn list_vaccinations(&self, bovine_id: Option<&str>) -> SyncResult<Vec<Vaccination>> {
        let query = HealthQuery::Vaccinations {
            bovine_id: bovine_id.map(str::to_string),
        };
        self.engine.read(&query).await?.into_vaccinations()
    }

    pub async fn overdue_vaccinations(&self) -> SyncResult<Vec<Vaccination>> {
        self.engine
            .read(&HealthQuery::OverdueVaccinations)
            .await?
            .into_vaccinations()
    }

    pub async fn active_quarantines(&self) -> SyncResult<Vec<Quarantine>> {
        self.engine
            .read(&HealthQuery::ActiveQuarantines)
            .await?
            .into_quarantines()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn record_health_check(
        &self,
        new: NewHealthCheck,
    ) -> SyncResult<Submission<HealthCheck>> {
        validate_new_health_check(&new)?;
        let submission = self
            .engine
            .enqueue_or_execute(HealthCommand::RecordCheck(new))
            .await?
            .try_map(HealthResponse::into_record)?;

        if let Submission::Applied(check) = &submission {
            self.eager.check_recorded(check.clone()).await;
        }
        Ok(submission)
    }

    pub async fn schedule_vaccination(
        &self,
        new: NewVaccination,
    ) -> SyncResult<Submission<Vaccination>> {
        validate_new_vaccination(&new)?;
        self.engine
            .enqueue_or_execute(HealthCommand::ScheduleVaccination(new))
            .await?
            .try_map(HealthResponse::into_vaccination)
    }

    /// Records an administered dose. Once applied, the vaccination's overdue
    /// alert is resolved.
    pub async fn record_vaccination(
        &self,
        dose: VaccinationDose,
    ) -> SyncResult<Submission<Vaccination>> {
        validate_name("vaccination_id", &dose.vaccination_id)?;
        let submission = self
            .engine
            .enqueue_or_execute(HealthCommand::RecordVaccination(dose))
            .await?
            .try_map(HealthResponse::into_vaccination)?;

        if let Submission::Applied(vaccination) = &submission {
            self.eager.dose_recorded(vaccination).await?;
        }
        Ok(submission)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Runs the overdue and quarantine rules over fresh aggregates.
    pub async fn scan(&self) -> SyncResult<ScanSummary> {
        scan(&self.engine, &self.vaccinations, &self.quarantines).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) -> SyncResult<()> {
        self.engine.start()?;

        let engine = self.engine.clone();
        let vaccinations = self.vaccinations.clone();
        let quarantines = self.quarantines.clone();
        self.schedule.start("health.scan", self.scan_interval, move || {
            let engine = engine.clone();
            let vaccinations = vaccinations.clone();
            let quarantines = quarantines.clone();
            async move { scan(&engine, &vaccinations, &quarantines).await }
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
    engine: &SyncEngine<Health>,
    vaccinations: &RuleEvaluator<Vaccination>,
    quarantines: &RuleEvaluator<Quarantine>,
) -> SyncResult<ScanSummary> {
    let (overdue, open) = try_join(
        engine.refresh(&HealthQuery::OverdueVaccinations),
        engine.refresh(&HealthQuery::ActiveQuarantines),
    )
    .await?;

    let overdue = vaccinations.evaluate_all(overdue.into_vaccinations()?).await;
    let open = quarantines.evaluate_all(open.into_quarantines()?).await;
    Ok(overdue.merge(open))
}
