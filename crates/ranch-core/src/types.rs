//! # Domain Types
//!
//! Records exchanged with the remote collaborator for each ranch domain.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Bovines      │   │     Health      │   │   Inventory     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Bovine         │   │  HealthCheck    │   │  InventoryItem  │       │
//! │  │  WeightRecord   │   │  VitalSigns     │   │  StockAdjust.   │       │
//! │  │  WeightTrend    │   │  Vaccination    │   │                 │       │
//! │  │                 │   │  Quarantine     │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │    Finance      │   New* structs are create payloads, *Patch        │
//! │  │  ─────────────  │   structs are partial updates. Both are what      │
//! │  │  Transaction    │   gets queued while the server is unreachable.    │
//! │  │  Budget         │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Field schemas are intentionally minimal: the engine only needs what the
//! alert rules read and what identifies an entity for cache invalidation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Bovines
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

/// Herd status of an animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BovineStatus {
    #[default]
    Active,
    Quarantined,
    Sold,
    Deceased,
}

/// An animal in the herd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Bovine {
    pub id: String,
    /// Visual/RFID ear tag, unique per ranch.
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: String,
    pub sex: Sex,
    #[ts(as = "Option<String>")]
    pub birth_date: Option<NaiveDate>,
    /// Most recent recorded weight.
    pub weight_kg: Option<f64>,
    pub status: BovineStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Payload for registering a new animal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBovine {
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: String,
    pub sex: Sex,
    #[ts(as = "Option<String>")]
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

impl NewBovine {
    /// Builds the record the UI shows while registration waits to sync.
    pub fn into_local(self, id: String, now: DateTime<Utc>) -> Bovine {
        Bovine {
            id,
            ear_tag: self.ear_tag,
            name: self.name,
            breed: self.breed,
            sex: self.sex,
            birth_date: self.birth_date,
            weight_kg: self.weight_kg,
            status: BovineStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an animal. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BovinePatch {
    pub name: Option<String>,
    pub breed: Option<String>,
    pub status: Option<BovineStatus>,
}

/// A weighing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WeightRecord {
    pub bovine_id: String,
    pub weight_kg: f64,
    #[ts(as = "String")]
    pub recorded_on: NaiveDate,
}

/// Server response to a weighing: the new weight next to the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WeightTrend {
    pub bovine_id: String,
    pub ear_tag: String,
    pub previous_kg: Option<f64>,
    pub current_kg: f64,
}

impl WeightTrend {
    /// Fraction of body weight lost since the previous weighing.
    ///
    /// Returns `None` without a usable previous weight; gains are negative.
    pub fn loss_fraction(&self) -> Option<f64> {
        let previous = self.previous_kg.filter(|kg| *kg > 0.0)?;
        Some((previous - self.current_kg) / previous)
    }
}

// =============================================================================
// Health
// =============================================================================

/// Vital signs taken during a health check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VitalSigns {
    pub temperature_c: f64,
    pub heart_rate_bpm: f64,
    pub respiratory_rate_bpm: f64,
    /// Cud chews per minute.
    pub rumination_per_min: f64,
}

/// A recorded health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthCheck {
    pub id: String,
    pub bovine_id: String,
    pub vitals: VitalSigns,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub checked_at: DateTime<Utc>,
}

/// Payload for recording a health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewHealthCheck {
    pub bovine_id: String,
    pub vitals: VitalSigns,
    pub notes: Option<String>,
}

impl NewHealthCheck {
    pub fn into_local(self, id: String, now: DateTime<Utc>) -> HealthCheck {
        HealthCheck {
            id,
            bovine_id: self.bovine_id,
            vitals: self.vitals,
            notes: self.notes,
            checked_at: now,
        }
    }
}

/// A scheduled or administered vaccination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Vaccination {
    pub id: String,
    pub bovine_id: String,
    pub vaccine: String,
    #[ts(as = "String")]
    pub due_on: NaiveDate,
    #[ts(as = "Option<String>")]
    pub administered_on: Option<NaiveDate>,
}

impl Vaccination {
    /// Days past due as of `today`; zero or negative when not yet due.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_on).num_days()
    }
}

/// Payload for scheduling a vaccination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewVaccination {
    pub bovine_id: String,
    pub vaccine: String,
    #[ts(as = "String")]
    pub due_on: NaiveDate,
}

/// Payload for marking a scheduled vaccination as administered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VaccinationDose {
    pub vaccination_id: String,
    #[ts(as = "String")]
    pub administered_on: NaiveDate,
    pub batch: Option<String>,
}

/// An open or closed quarantine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quarantine {
    pub id: String,
    pub bovine_id: String,
    pub reason: String,
    #[ts(as = "String")]
    pub started_on: NaiveDate,
    #[ts(as = "Option<String>")]
    pub ends_on: Option<NaiveDate>,
    /// Breaches (animal found outside its pen, contact with herd) not yet
    /// signed off by a vet.
    pub unresolved_violations: u32,
}

// =============================================================================
// Inventory
// =============================================================================

/// A stocked supply (feed, medicine, fencing...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryItem {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub category: String,
    /// Unit of measure ("kg", "dose", "bale").
    pub unit: String,
    pub quantity: f64,
    /// Reorder point.
    pub minimum_quantity: f64,
    #[ts(as = "Option<String>")]
    pub expires_on: Option<NaiveDate>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// True when on-hand quantity is below the reorder point.
    pub fn is_below_minimum(&self) -> bool {
        self.minimum_quantity > 0.0 && self.quantity < self.minimum_quantity
    }
}

/// Payload for adding a supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewInventoryItem {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub minimum_quantity: f64,
    #[ts(as = "Option<String>")]
    pub expires_on: Option<NaiveDate>,
}

impl NewInventoryItem {
    pub fn into_local(self, id: String, now: DateTime<Utc>) -> InventoryItem {
        InventoryItem {
            id,
            sku: self.sku,
            name: self.name,
            category: self.category,
            unit: self.unit,
            quantity: self.quantity,
            minimum_quantity: self.minimum_quantity,
            expires_on: self.expires_on,
            updated_at: now,
        }
    }
}

/// Partial update for a supply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub minimum_quantity: Option<f64>,
    #[ts(as = "Option<String>")]
    pub expires_on: Option<NaiveDate>,
}

/// A relative stock movement (consumption is negative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub item_id: String,
    pub delta: f64,
    pub reason: String,
}

// =============================================================================
// Finance
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A booked income or expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Money,
    pub description: String,
    #[ts(as = "String")]
    pub occurred_on: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Payload for booking a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Money,
    pub description: String,
    #[ts(as = "String")]
    pub occurred_on: NaiveDate,
}

impl NewTransaction {
    pub fn into_local(self, id: String, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            category: self.category,
            amount: self.amount,
            description: self.description,
            occurred_on: self.occurred_on,
            created_at: now,
        }
    }
}

/// Partial update for a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionPatch {
    pub category: Option<String>,
    pub amount: Option<Money>,
    pub description: Option<String>,
}

/// Spending against a category limit for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Budget {
    pub category: String,
    /// Period label, `YYYY-MM`.
    pub period: String,
    pub limit: Money,
    pub spent: Money,
}

impl Budget {
    /// Spent as a fraction of the limit.
    pub fn usage(&self) -> Option<f64> {
        self.spent.ratio_of(self.limit)
    }
}

/// Payload for setting a category limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BudgetLimit {
    pub category: String,
    pub period: String,
    pub limit: Money,
}

/// Period label (`YYYY-MM`) a date falls into.
pub fn budget_period(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weight_loss_fraction() {
        let trend = WeightTrend {
            bovine_id: "b-1".into(),
            ear_tag: "A-001".into(),
            previous_kg: Some(500.0),
            current_kg: 450.0,
        };
        assert_eq!(trend.loss_fraction(), Some(0.1));

        let first = WeightTrend {
            previous_kg: None,
            ..trend
        };
        assert_eq!(first.loss_fraction(), None);
    }

    #[test]
    fn test_days_overdue() {
        let vaccination = Vaccination {
            id: "v-1".into(),
            bovine_id: "b-1".into(),
            vaccine: "Clostridial 7-way".into(),
            due_on: date(2026, 10, 1),
            administered_on: None,
        };
        assert_eq!(vaccination.days_overdue(date(2026, 10, 11)), 10);
        assert_eq!(vaccination.days_overdue(date(2026, 9, 30)), -1);
    }

    #[test]
    fn test_below_minimum() {
        let now = Utc::now();
        let item = NewInventoryItem {
            sku: "FEED-01".into(),
            name: "Alfalfa bale".into(),
            category: "feed".into(),
            unit: "bale".into(),
            quantity: 4.0,
            minimum_quantity: 10.0,
            expires_on: None,
        }
        .into_local("i-1".into(), now);
        assert!(item.is_below_minimum());

        let untracked = InventoryItem {
            minimum_quantity: 0.0,
            ..item
        };
        assert!(!untracked.is_below_minimum());
    }

    #[test]
    fn test_budget_period() {
        assert_eq!(budget_period(date(2026, 3, 9)), "2026-03");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&BovineStatus::Quarantined).unwrap();
        assert_eq!(json, "\"quarantined\"");
    }
}
