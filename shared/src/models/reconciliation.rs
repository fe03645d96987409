//! Physical counts and reconciliation classification
//!
//! Reconciliation compares the ledger-backed quantity against the most
//! recent physical count. Classification is a pure function of the two and
//! of whether a justification has been attached, so it is directly testable
//! without a store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A manually recorded physical inventory measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalCount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub batch_id: Uuid,
    pub counted_quantity: Decimal,
    pub unit: super::UnitOfMeasure,
    pub counted_by: Uuid,
    pub counted_at: DateTime<Utc>,
    /// Justification fields; immutable once set
    pub justification_reason_id: Option<Uuid>,
    pub justification_reason: Option<String>,
    pub justification_notes: Option<String>,
    pub justified_by: Option<Uuid>,
    pub justified_at: Option<DateTime<Utc>>,
}

impl PhysicalCount {
    pub fn is_justified(&self) -> bool {
        self.justified_at.is_some()
    }
}

/// Reconciliation classification for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// No physical count has ever been recorded
    NoReconciliation,
    /// A count exists and no justification is attached
    Discrepancy,
    /// A count exists with an attached justification
    Justified,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::NoReconciliation => "no_reconciliation",
            ReconciliationStatus::Discrepancy => "discrepancy",
            ReconciliationStatus::Justified => "justified",
        }
    }
}

/// Classify a batch's reconciliation state from its latest count.
pub fn classify_reconciliation(latest_count: Option<&PhysicalCount>) -> ReconciliationStatus {
    match latest_count {
        None => ReconciliationStatus::NoReconciliation,
        Some(count) if count.is_justified() => ReconciliationStatus::Justified,
        Some(_) => ReconciliationStatus::Discrepancy,
    }
}

/// Discrepancy between the ledger quantity and a physical count. Positive
/// means a shortage (less on hand than the ledger says).
pub fn discrepancy(current_units: Decimal, counted_quantity: Decimal) -> Decimal {
    current_units - counted_quantity
}

/// Discrepancy as a percentage of the ledger quantity. The divisor is
/// floored at 1 so a zero-unit batch cannot divide by zero.
pub fn discrepancy_percentage(current_units: Decimal, counted_quantity: Decimal) -> Decimal {
    let divisor = current_units.max(Decimal::ONE);
    discrepancy(current_units, counted_quantity) / divisor * Decimal::from(100)
}
