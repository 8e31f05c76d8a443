//! # Rule Catalog
//!
//! The concrete alert rules each domain facade registers.
//!
//! ## Rules by Domain
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────┬───────────────┐
//! │ Domain       │ Rule                         │ Trigger │ Measure       │
//! ├──────────────┼──────────────────────────────┼─────────┼───────────────┤
//! │ bovines      │ bovine.rapid_weight_loss     │ eager   │ loss fraction │
//! │ health       │ health.vital_signs           │ eager   │ abnormal count│
//! │ health       │ health.vaccination_overdue   │ scan    │ days overdue  │
//! │ health       │ health.quarantine_violation  │ scan    │ violations    │
//! │ inventory    │ inventory.low_stock          │ both    │ shortfall     │
//! │ inventory    │ inventory.expiring_soon      │ both    │ days left     │
//! │ finance      │ finance.budget_overrun       │ both    │ usage         │
//! └──────────────┴──────────────────────────────┴─────────┴───────────────┘
//! ```

use std::time::Duration;

use crate::alert::{AlertDraft, Severity, SubjectKey};
use crate::rules::{AlertRule, NormalRange, Observed, SeverityScale};
use crate::types::{Budget, HealthCheck, InventoryItem, Quarantine, Vaccination, WeightTrend};

// =============================================================================
// Bovines
// =============================================================================

pub mod bovines {
    use super::*;

    pub const RAPID_WEIGHT_LOSS: &str = "bovine.rapid_weight_loss";

    /// Loss since the previous weighing: 5% low, 10% medium, 15% high, 25%
    /// critical.
    pub fn weight_loss_scale() -> SeverityScale {
        SeverityScale::new([
            (0.05, Severity::Low),
            (0.10, Severity::Medium),
            (0.15, Severity::High),
            (0.25, Severity::Critical),
        ])
    }

    pub fn rapid_weight_loss(interval: Duration) -> AlertRule<Observed<WeightTrend>> {
        let scale = weight_loss_scale();
        AlertRule::new(RAPID_WEIGHT_LOSS, interval, move |snapshot: &Observed<WeightTrend>| {
            let trend = &snapshot.value;
            let loss = trend.loss_fraction()?;
            let severity = scale.classify(loss)?;
            Some(
                AlertDraft::new(
                    RAPID_WEIGHT_LOSS,
                    SubjectKey::new("bovine", &trend.bovine_id, "rapid-weight-loss"),
                    severity,
                    format!("{} lost {:.1}% body weight", trend.ear_tag, loss * 100.0),
                )
                .with_description(format!(
                    "Weighed {:.1} kg, previously {:.1} kg",
                    trend.current_kg,
                    trend.previous_kg.unwrap_or_default()
                ))
                .with_action("Schedule a health check")
                .with_action("Review feed ration and water access"),
            )
        })
    }
}

// =============================================================================
// Health
// =============================================================================

pub mod health {
    use super::*;

    pub const VITAL_SIGNS: &str = "health.vital_signs";
    pub const VACCINATION_OVERDUE: &str = "health.vaccination_overdue";
    pub const QUARANTINE_VIOLATION: &str = "health.quarantine_violation";

    /// Adult cattle reference ranges.
    pub const TEMPERATURE_C: NormalRange = NormalRange::new(38.0, 39.5);
    pub const HEART_RATE_BPM: NormalRange = NormalRange::new(48.0, 84.0);
    pub const RESPIRATORY_RATE_BPM: NormalRange = NormalRange::new(26.0, 50.0);
    pub const RUMINATION_PER_MIN: NormalRange = NormalRange::new(35.0, 70.0);

    /// One abnormal sign is low, two medium, three high, all four critical.
    pub fn abnormal_sign_scale() -> SeverityScale {
        SeverityScale::new([
            (1.0, Severity::Low),
            (2.0, Severity::Medium),
            (3.0, Severity::High),
            (4.0, Severity::Critical),
        ])
    }

    /// Names of the vital signs outside their normal range.
    pub fn abnormal_signs(check: &HealthCheck) -> Vec<&'static str> {
        let vitals = &check.vitals;
        [
            ("temperature", TEMPERATURE_C, vitals.temperature_c),
            ("heart rate", HEART_RATE_BPM, vitals.heart_rate_bpm),
            ("respiratory rate", RESPIRATORY_RATE_BPM, vitals.respiratory_rate_bpm),
            ("rumination", RUMINATION_PER_MIN, vitals.rumination_per_min),
        ]
        .into_iter()
        .filter(|(_, range, value)| !range.contains(*value))
        .map(|(name, _, _)| name)
        .collect()
    }

    pub fn vital_signs(interval: Duration) -> AlertRule<Observed<HealthCheck>> {
        let scale = abnormal_sign_scale();
        AlertRule::new(VITAL_SIGNS, interval, move |snapshot: &Observed<HealthCheck>| {
            let check = &snapshot.value;
            let abnormal = abnormal_signs(check);
            let severity = scale.classify(abnormal.len() as f64)?;
            Some(
                AlertDraft::new(
                    VITAL_SIGNS,
                    SubjectKey::new("bovine", &check.bovine_id, "vital-signs"),
                    severity,
                    format!("{} vital sign(s) outside normal range", abnormal.len()),
                )
                .with_description(format!("Abnormal: {}", abnormal.join(", ")))
                .with_action("Re-check vitals within 12 hours")
                .with_action("Contact the veterinarian if signs persist"),
            )
        })
    }

    /// 1-7 days low, 8-30 medium, over 30 high.
    pub fn overdue_scale() -> SeverityScale {
        SeverityScale::new([
            (1.0, Severity::Low),
            (8.0, Severity::Medium),
            (31.0, Severity::High),
        ])
    }

    pub fn vaccination_overdue(interval: Duration) -> AlertRule<Observed<Vaccination>> {
        let scale = overdue_scale();
        AlertRule::new(
            VACCINATION_OVERDUE,
            interval,
            move |snapshot: &Observed<Vaccination>| {
                let vaccination = &snapshot.value;
                if vaccination.administered_on.is_some() {
                    return None;
                }
                let days = vaccination.days_overdue(snapshot.today());
                let severity = scale.classify(days as f64)?;
                Some(
                    AlertDraft::new(
                        VACCINATION_OVERDUE,
                        SubjectKey::new(
                            "vaccination",
                            &vaccination.id,
                            "overdue",
                        ),
                        severity,
                        format!("{} overdue by {} day(s)", vaccination.vaccine, days),
                    )
                    .with_description(format!(
                        "Bovine {} was due on {}",
                        vaccination.bovine_id, vaccination.due_on
                    ))
                    .with_action("Administer the vaccine and record the dose"),
                )
            },
        )
    }

    /// One open violation is medium, two high, four or more critical.
    pub fn violation_scale() -> SeverityScale {
        SeverityScale::new([
            (1.0, Severity::Medium),
            (2.0, Severity::High),
            (4.0, Severity::Critical),
        ])
    }

    pub fn quarantine_violation(interval: Duration) -> AlertRule<Observed<Quarantine>> {
        let scale = violation_scale();
        AlertRule::new(
            QUARANTINE_VIOLATION,
            interval,
            move |snapshot: &Observed<Quarantine>| {
                let quarantine = &snapshot.value;
                let severity = scale.classify(quarantine.unresolved_violations as f64)?;
                Some(
                    AlertDraft::new(
                        QUARANTINE_VIOLATION,
                        SubjectKey::new("quarantine", &quarantine.id, "violation"),
                        severity,
                        format!(
                            "{} unresolved quarantine violation(s)",
                            quarantine.unresolved_violations
                        ),
                    )
                    .with_description(format!(
                        "Bovine {} quarantined since {}: {}",
                        quarantine.bovine_id, quarantine.started_on, quarantine.reason
                    ))
                    .with_action("Inspect the quarantine pen")
                    .with_action("Have a vet sign off each violation"),
                )
            },
        )
    }
}

// =============================================================================
// Inventory
// =============================================================================

pub mod inventory {
    use super::*;

    pub const LOW_STOCK: &str = "inventory.low_stock";
    pub const EXPIRING_SOON: &str = "inventory.expiring_soon";

    /// Days before expiry at which the expiring rule starts firing.
    pub const EXPIRY_HORIZON_DAYS: i64 = 30;

    /// Measured as shortfall (`1 - quantity / minimum`): any shortfall is
    /// low, half gone medium, three quarters gone high, empty critical.
    pub fn shortfall_scale() -> SeverityScale {
        SeverityScale::new([
            (f64::MIN_POSITIVE, Severity::Low),
            (0.5, Severity::Medium),
            (0.75, Severity::High),
            (1.0, Severity::Critical),
        ])
    }

    pub fn low_stock(interval: Duration) -> AlertRule<Observed<InventoryItem>> {
        let scale = shortfall_scale();
        AlertRule::new(LOW_STOCK, interval, move |snapshot: &Observed<InventoryItem>| {
            let item = &snapshot.value;
            if !item.is_below_minimum() {
                return None;
            }
            let shortfall = (1.0 - item.quantity / item.minimum_quantity).min(1.0);
            let severity = scale.classify(shortfall)?;
            Some(
                AlertDraft::new(
                    LOW_STOCK,
                    SubjectKey::new("inventory-item", &item.id, "low-stock"),
                    severity,
                    format!("{} below minimum stock", item.name),
                )
                .with_description(format!(
                    "{} {} on hand, minimum {}",
                    item.quantity, item.unit, item.minimum_quantity
                ))
                .with_action(format!("Reorder {}", item.sku)),
            )
        })
    }

    pub fn expiring_soon(interval: Duration) -> AlertRule<Observed<InventoryItem>> {
        AlertRule::new(
            EXPIRING_SOON,
            interval,
            move |snapshot: &Observed<InventoryItem>| {
                let item = &snapshot.value;
                let expires_on = item.expires_on?;
                let days_left = (expires_on - snapshot.today()).num_days();
                let severity = match days_left {
                    d if d < 0 => Severity::High,
                    0..=7 => Severity::Medium,
                    d if d <= EXPIRY_HORIZON_DAYS => Severity::Low,
                    _ => return None,
                };
                let title = if days_left < 0 {
                    format!("{} expired on {}", item.name, expires_on)
                } else {
                    format!("{} expires in {} day(s)", item.name, days_left)
                };
                Some(
                    AlertDraft::new(
                        EXPIRING_SOON,
                        SubjectKey::new("inventory-item", &item.id, "expiring"),
                        severity,
                        title,
                    )
                    .with_description(format!("{} {} affected", item.quantity, item.unit))
                    .with_action("Use or dispose of the affected stock"),
                )
            },
        )
    }
}

// =============================================================================
// Finance
// =============================================================================

pub mod finance {
    use super::*;

    pub const BUDGET_OVERRUN: &str = "finance.budget_overrun";

    /// 90% of limit low, 100% medium, 125% high, 150% critical.
    pub fn usage_scale() -> SeverityScale {
        SeverityScale::new([
            (0.9, Severity::Low),
            (1.0, Severity::Medium),
            (1.25, Severity::High),
            (1.5, Severity::Critical),
        ])
    }

    pub fn budget_overrun(interval: Duration) -> AlertRule<Observed<Budget>> {
        let scale = usage_scale();
        AlertRule::new(BUDGET_OVERRUN, interval, move |snapshot: &Observed<Budget>| {
            let budget = &snapshot.value;
            let usage = budget.usage()?;
            let severity = scale.classify(usage)?;
            Some(
                AlertDraft::new(
                    BUDGET_OVERRUN,
                    SubjectKey::new(
                        "budget",
                        &format!("{}@{}", budget.category, budget.period),
                        "overrun",
                    ),
                    severity,
                    format!(
                        "{} budget at {:.0}% for {}",
                        budget.category,
                        usage * 100.0,
                        budget.period
                    ),
                )
                .with_description(format!("Spent {} of {}", budget.spent, budget.limit))
                .with_action("Review recent expenses in this category"),
            )
        })
    }
}
