//! # Alert Rules
//!
//! A rule is a pure function from a domain snapshot to at most one
//! [`AlertDraft`]. Rules never look at the clock: snapshots arrive wrapped in
//! [`Observed`], which carries the time the snapshot was taken.
//!
//! Severity is domain data, not engine logic. Each rule owns a
//! [`SeverityScale`] mapping its own measure (abnormal sign count, fraction
//! over budget, days overdue) onto a [`Severity`].

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::time::Duration;

use crate::alert::{AlertDraft, Severity};
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Observed Snapshot
// =============================================================================

/// A snapshot value together with the time it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub observed_at: DateTime<Utc>,
}

impl<T> Observed<T> {
    pub fn new(value: T, observed_at: DateTime<Utc>) -> Self {
        Observed { value, observed_at }
    }

    /// Calendar day of the observation (UTC).
    pub fn today(&self) -> NaiveDate {
        self.observed_at.date_naive()
    }
}

// =============================================================================
// Normal Range
// =============================================================================

/// An inclusive range of normal values for a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalRange {
    pub min: f64,
    pub max: f64,
}

impl NormalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        NormalRange { min, max }
    }

    /// Checked constructor for ranges coming from configuration.
    pub fn checked(name: &str, min: f64, max: f64) -> CoreResult<Self> {
        if min > max {
            return Err(CoreError::InvalidRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok(NormalRange { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Distance outside the range, 0.0 inside it.
    pub fn deviation(&self, value: f64) -> f64 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }
}

// =============================================================================
// Severity Scale
// =============================================================================

/// Step function from a numeric measure to a severity.
///
/// Each step is `(threshold, severity)`; a measure gets the severity of the
/// highest threshold it reaches. Below the lowest threshold nothing fires.
///
/// ```rust
/// use ranch_core::alert::Severity;
/// use ranch_core::rules::SeverityScale;
///
/// let scale = SeverityScale::new([(0.9, Severity::Low), (1.0, Severity::Medium)]);
/// assert_eq!(scale.classify(0.5), None);
/// assert_eq!(scale.classify(0.95), Some(Severity::Low));
/// assert_eq!(scale.classify(1.0), Some(Severity::Medium));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityScale {
    steps: Vec<(f64, Severity)>,
}

impl SeverityScale {
    pub fn new(steps: impl IntoIterator<Item = (f64, Severity)>) -> Self {
        let mut steps: Vec<(f64, Severity)> = steps.into_iter().collect();
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        SeverityScale { steps }
    }

    pub fn classify(&self, measure: f64) -> Option<Severity> {
        self.steps
            .iter()
            .rev()
            .find(|(threshold, _)| measure >= *threshold)
            .map(|(_, severity)| *severity)
    }
}

// =============================================================================
// Alert Rule
// =============================================================================

type Predicate<S> = Box<dyn Fn(&S) -> Option<AlertDraft> + Send + Sync>;

/// A named predicate over snapshots of type `S`.
pub struct AlertRule<S> {
    id: &'static str,
    interval: Duration,
    predicate: Predicate<S>,
}

impl<S> AlertRule<S> {
    /// Creates a rule. `interval` is how often periodic scans re-run it.
    pub fn new<F>(id: &'static str, interval: Duration, predicate: F) -> Self
    where
        F: Fn(&S) -> Option<AlertDraft> + Send + Sync + 'static,
    {
        AlertRule {
            id,
            interval,
            predicate: Box::new(predicate),
        }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn evaluate(&self, snapshot: &S) -> Option<AlertDraft> {
        (self.predicate)(snapshot)
    }
}

impl<S> fmt::Debug for AlertRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// The rules one facade registers for a snapshot type.
#[derive(Debug)]
pub struct RuleSet<S> {
    rules: Vec<AlertRule<S>>,
}

impl<S> Default for RuleSet<S> {
    fn default() -> Self {
        RuleSet { rules: Vec::new() }
    }
}

impl<S> RuleSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: AlertRule<S>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: AlertRule<S>) {
        self.rules.push(rule);
    }

    /// Runs every rule; each contributes zero or one draft.
    pub fn evaluate(&self, snapshot: &S) -> Vec<AlertDraft> {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(snapshot))
            .collect()
    }

    /// Shortest evaluation interval among the rules.
    pub fn min_interval(&self) -> Option<Duration> {
        self.rules.iter().map(AlertRule::interval).min()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(AlertRule::id).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SubjectKey;

    #[test]
    fn test_normal_range_deviation() {
        let range = NormalRange::new(38.0, 39.5);
        assert!(range.contains(38.0));
        assert!(range.contains(39.5));
        assert_eq!(range.deviation(39.0), 0.0);
        assert_eq!(range.deviation(40.5), 1.0);
        assert_eq!(range.deviation(37.5), 0.5);
        assert!(NormalRange::checked("temperature", 40.0, 38.0).is_err());
    }

    #[test]
    fn test_scale_ignores_declaration_order() {
        let scale = SeverityScale::new([
            (3.0, Severity::High),
            (1.0, Severity::Low),
            (2.0, Severity::Medium),
        ]);
        assert_eq!(scale.classify(1.0), Some(Severity::Low));
        assert_eq!(scale.classify(2.0), Some(Severity::Medium));
        assert_eq!(scale.classify(3.0), Some(Severity::High));
        assert_eq!(scale.classify(7.0), Some(Severity::High));
        assert_eq!(scale.classify(0.5), None);
    }

    #[test]
    fn test_rule_set_collects_one_draft_per_rule() {
        let set: RuleSet<i32> = RuleSet::new()
            .with(AlertRule::new("positive", Duration::from_secs(60), |n: &i32| {
                (*n > 0).then(|| {
                    AlertDraft::new(
                        "positive",
                        SubjectKey::new("n", &n.to_string(), "positive"),
                        Severity::Info,
                        "positive",
                    )
                })
            }))
            .with(AlertRule::new("even", Duration::from_secs(30), |n: &i32| {
                (n % 2 == 0).then(|| {
                    AlertDraft::new(
                        "even",
                        SubjectKey::new("n", &n.to_string(), "even"),
                        Severity::Info,
                        "even",
                    )
                })
            }));

        assert_eq!(set.evaluate(&4).len(), 2);
        assert_eq!(set.evaluate(&3).len(), 1);
        assert!(set.evaluate(&-1).is_empty());
        assert_eq!(set.min_interval(), Some(Duration::from_secs(30)));
        assert_eq!(set.ids(), vec!["positive", "even"]);
    }
}
