//! # Validation Module
//!
//! Payload checks run by the facades before a command reaches the sync
//! engine.
//!
//! ## Where Validation Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  facade.register_bovine(new)                                            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  THIS MODULE ── Err ──► SyncError::Validation (nothing queued)          │
//! │        │ Ok                                                             │
//! │        ▼                                                                │
//! │  SyncEngine::enqueue_or_execute ──► remote, or queue while offline      │
//! │                                                                         │
//! │  A payload that would be rejected later must not sit in the queue       │
//! │  and fail on every replay.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ranch_core::validation::{validate_ear_tag, validate_weight};
//!
//! validate_ear_tag("RX-104").unwrap();
//! assert!(validate_weight(0.0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{
    BudgetLimit, NewBovine, NewHealthCheck, NewInventoryItem, NewTransaction, NewVaccination,
    StockAdjustment, VitalSigns,
};
use crate::{MAX_BOVINE_WEIGHT_KG, MAX_TAG_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn tag_like(field: &str, value: &str) -> ValidationResult<()> {
    required(field, value)?;
    max_len(field, value, MAX_TAG_LEN)?;

    if !value
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }
    Ok(())
}

/// Validates an ear tag.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_TAG_LEN`] characters
/// - ASCII letters, digits, hyphens and underscores only
///
/// ```rust
/// use ranch_core::validation::validate_ear_tag;
///
/// assert!(validate_ear_tag("A-001").is_ok());
/// assert!(validate_ear_tag("").is_err());
/// assert!(validate_ear_tag("tag with spaces").is_err());
/// ```
pub fn validate_ear_tag(tag: &str) -> ValidationResult<()> {
    tag_like("ear_tag", tag)
}

/// Validates an inventory SKU. Same rules as ear tags.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    tag_like("sku", sku)
}

/// Validates a free-text name (breed, item name, category).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    required(field, name)?;
    max_len(field, name, MAX_NAME_LEN)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a recorded weight in kilograms.
pub fn validate_weight(weight_kg: f64) -> ValidationResult<()> {
    if weight_kg.is_nan() || weight_kg <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "weight_kg".to_string(),
        });
    }
    if weight_kg > MAX_BOVINE_WEIGHT_KG {
        return Err(ValidationError::OutOfRange {
            field: "weight_kg".to_string(),
            min: 0.0,
            max: MAX_BOVINE_WEIGHT_KG,
        });
    }
    Ok(())
}

fn physically_plausible(field: &str, value: f64, min: f64, max: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

/// Rejects readings no live animal could produce.
///
/// Abnormal but possible values pass; flagging those is the vital-signs
/// rule's job.
pub fn validate_vitals(vitals: &VitalSigns) -> ValidationResult<()> {
    physically_plausible("temperature_c", vitals.temperature_c, 30.0, 45.0)?;
    physically_plausible("heart_rate_bpm", vitals.heart_rate_bpm, 10.0, 250.0)?;
    physically_plausible("respiratory_rate_bpm", vitals.respiratory_rate_bpm, 5.0, 150.0)?;
    physically_plausible("rumination_per_min", vitals.rumination_per_min, 0.0, 120.0)
}

/// Validates an on-hand or minimum quantity.
pub fn validate_quantity(field: &str, quantity: f64) -> ValidationResult<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0.0,
            max: f64::MAX,
        });
    }
    Ok(())
}

/// Validates a monetary amount. Transactions carry their direction in
/// their kind, so amounts are always positive.
pub fn validate_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates a `YYYY-MM` budget period label.
pub fn validate_period(period: &str) -> ValidationResult<()> {
    let valid = chrono::NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d").is_ok()
        && period.len() == 7;
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "period".to_string(),
            reason: "expected YYYY-MM".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Payload Validators
// =============================================================================

pub fn validate_new_bovine(new: &NewBovine) -> ValidationResult<()> {
    validate_ear_tag(&new.ear_tag)?;
    validate_name("breed", &new.breed)?;
    if let Some(name) = &new.name {
        max_len("name", name, MAX_NAME_LEN)?;
    }
    if let Some(weight) = new.weight_kg {
        validate_weight(weight)?;
    }
    Ok(())
}

pub fn validate_new_health_check(new: &NewHealthCheck) -> ValidationResult<()> {
    required("bovine_id", &new.bovine_id)?;
    validate_vitals(&new.vitals)
}

pub fn validate_new_vaccination(new: &NewVaccination) -> ValidationResult<()> {
    required("bovine_id", &new.bovine_id)?;
    validate_name("vaccine", &new.vaccine)
}

pub fn validate_new_item(new: &NewInventoryItem) -> ValidationResult<()> {
    validate_sku(&new.sku)?;
    validate_name("name", &new.name)?;
    validate_name("category", &new.category)?;
    validate_name("unit", &new.unit)?;
    validate_quantity("quantity", new.quantity)?;
    validate_quantity("minimum_quantity", new.minimum_quantity)
}

pub fn validate_adjustment(adjustment: &StockAdjustment) -> ValidationResult<()> {
    required("item_id", &adjustment.item_id)?;
    if !adjustment.delta.is_finite() || adjustment.delta == 0.0 {
        return Err(ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        });
    }
    validate_name("reason", &adjustment.reason)
}

pub fn validate_new_transaction(new: &NewTransaction) -> ValidationResult<()> {
    validate_name("category", &new.category)?;
    validate_amount(new.amount)?;
    max_len("description", &new.description, MAX_NAME_LEN)
}

pub fn validate_budget_limit(limit: &BudgetLimit) -> ValidationResult<()> {
    validate_name("category", &limit.category)?;
    validate_period(&limit.period)?;
    validate_amount(limit.limit)
}
