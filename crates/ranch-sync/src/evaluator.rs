//! # Rule Evaluator
//!
//! Runs a domain's rule set over snapshots and hands every draft to the
//! [`AlertRegistry`].
//!
//! Two entry points match the two triggers: [`RuleEvaluator::evaluate`] for
//! the single entity a mutation just touched, and
//! [`RuleEvaluator::evaluate_all`] for the aggregates a periodic scan fetches.
//! Both stamp snapshots with the injected clock, so rules that look at dates
//! (overdue, expiring) are deterministic under test.

use ranch_core::{Observed, RuleSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::alerts::{AlertRegistry, RaiseOutcome};
use crate::clock::Clock;

/// Counters from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub snapshots: usize,
    /// Drafts produced by rules.
    pub fired: usize,
    pub created: usize,
    pub suppressed: usize,
}

impl ScanSummary {
    pub fn merge(self, other: ScanSummary) -> ScanSummary {
        ScanSummary {
            snapshots: self.snapshots + other.snapshots,
            fired: self.fired + other.fired,
            created: self.created + other.created,
            suppressed: self.suppressed + other.suppressed,
        }
    }
}

/// Evaluates rules over snapshots of type `S`.
pub struct RuleEvaluator<S> {
    rules: Arc<RuleSet<Observed<S>>>,
    registry: AlertRegistry,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for RuleEvaluator<S> {
    fn clone(&self) -> Self {
        RuleEvaluator {
            rules: self.rules.clone(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S> std::fmt::Debug for RuleEvaluator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEvaluator")
            .field("rules", &self.rules.ids())
            .finish_non_exhaustive()
    }
}

impl<S> RuleEvaluator<S> {
    pub fn new(rules: RuleSet<Observed<S>>, registry: AlertRegistry, clock: Arc<dyn Clock>) -> Self {
        RuleEvaluator {
            rules: Arc::new(rules),
            registry,
            clock,
        }
    }

    /// Runs every rule against one snapshot.
    pub async fn evaluate(&self, snapshot: S) -> Vec<RaiseOutcome> {
        let observed = Observed::new(snapshot, self.clock.now());
        let drafts = self.rules.evaluate(&observed);

        let mut outcomes = Vec::with_capacity(drafts.len());
        for draft in drafts {
            debug!(rule = %draft.rule_id, subject = %draft.subject, severity = %draft.severity, "Rule fired");
            outcomes.push(self.registry.raise(draft).await);
        }
        outcomes
    }

    /// Runs every rule against each snapshot in turn.
    pub async fn evaluate_all(&self, snapshots: impl IntoIterator<Item = S>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for snapshot in snapshots {
            summary.snapshots += 1;
            for outcome in self.evaluate(snapshot).await {
                summary.fired += 1;
                if outcome.is_created() {
                    summary.created += 1;
                } else {
                    summary.suppressed += 1;
                }
            }
        }
        summary
    }

    /// Shortest interval among the registered rules.
    pub fn interval(&self) -> Option<Duration> {
        self.rules.min_interval()
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.ids()
    }

    pub fn registry(&self) -> &AlertRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::t0;
    use ranch_core::catalog::health;
    use ranch_core::{HealthCheck, Severity, VitalSigns};

    fn check(id: &str, temperature_c: f64, heart_rate_bpm: f64, rumination: f64) -> HealthCheck {
        HealthCheck {
            id: id.to_string(),
            bovine_id: "b-7".to_string(),
            vitals: VitalSigns {
                temperature_c,
                heart_rate_bpm,
                respiratory_rate_bpm: 30.0,
                rumination_per_min: rumination,
            },
            notes: None,
            checked_at: t0(),
        }
    }

    fn evaluator() -> RuleEvaluator<HealthCheck> {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = AlertRegistry::new(clock.clone());
        RuleEvaluator::new(
            RuleSet::new().with(health::vital_signs(Duration::from_secs(300))),
            registry,
            clock,
        )
    }

    #[tokio::test]
    async fn test_three_abnormal_signs_raise_high() {
        let evaluator = evaluator();
        let outcomes = evaluator.evaluate(check("h-1", 41.0, 110.0, 10.0)).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_created());
        assert_eq!(outcomes[0].alert().severity, Severity::High);
        assert_eq!(outcomes[0].alert().created_at, t0());
    }

    #[tokio::test]
    async fn test_scan_counts_created_and_suppressed() {
        let evaluator = evaluator();
        let summary = evaluator
            .evaluate_all(vec![
                check("h-1", 40.2, 60.0, 50.0),
                check("h-2", 40.4, 60.0, 50.0),
                check("h-3", 38.5, 60.0, 50.0),
            ])
            .await;

        // Same bovine: the second abnormal check is a duplicate.
        assert_eq!(
            summary,
            ScanSummary {
                snapshots: 3,
                fired: 2,
                created: 1,
                suppressed: 1,
            }
        );
        assert_eq!(evaluator.registry().active_count().await, 1);
        assert_eq!(evaluator.interval(), Some(Duration::from_secs(300)));
        assert_eq!(evaluator.rule_ids(), vec![health::VITAL_SIGNS]);
    }
}
