//! Batch model and lifecycle rules
//!
//! A batch is a tracked quantity of cultivated or processed material. Its
//! `current_units` field is a cached projection of the traceability ledger:
//! every quantity-changing operation appends a ledger event in the same
//! transaction that mutates the batch, so the two can never diverge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProductCategory, UnitOfMeasure};

/// A quantity of material tracked from creation to disposition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub facility_id: Uuid,
    pub cultivation_area_id: Option<Uuid>,
    /// Set when this batch was created by splitting another
    pub parent_batch_id: Option<Uuid>,
    /// Unique batch code (e.g., "CCP-2024-NIA-0001")
    pub batch_code: String,
    pub name: String,
    pub product_type: String,
    pub product_category: ProductCategory,
    pub variety: Option<String>,
    pub end_type: Option<String>,
    /// Quantity at creation; the base the ledger replays from
    pub initial_units: Decimal,
    /// Ledger-backed quantity; never negative
    pub current_units: Decimal,
    pub unit: UnitOfMeasure,
    pub is_packaged: bool,
    pub sub_location: Option<String>,
    pub status: BatchStatus,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub is_recalled: bool,
    pub recalled_at: Option<DateTime<Utc>>,
    pub recalled_by: Option<Uuid>,
    pub recall_reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Batches in a terminal state accept no further quantity changes.
    pub fn is_mutable(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    OnHold,
    Quarantine,
    Released,
    InTransit,
    Destroyed,
    Sold,
    Archived,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 8] = [
        BatchStatus::Active,
        BatchStatus::OnHold,
        BatchStatus::Quarantine,
        BatchStatus::Released,
        BatchStatus::InTransit,
        BatchStatus::Destroyed,
        BatchStatus::Sold,
        BatchStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::OnHold => "on_hold",
            BatchStatus::Quarantine => "quarantine",
            BatchStatus::Released => "released",
            BatchStatus::InTransit => "in_transit",
            BatchStatus::Destroyed => "destroyed",
            BatchStatus::Sold => "sold",
            BatchStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BatchStatus::Active),
            "on_hold" => Some(BatchStatus::OnHold),
            "quarantine" => Some(BatchStatus::Quarantine),
            "released" => Some(BatchStatus::Released),
            "in_transit" => Some(BatchStatus::InTransit),
            "destroyed" => Some(BatchStatus::Destroyed),
            "sold" => Some(BatchStatus::Sold),
            "archived" => Some(BatchStatus::Archived),
            _ => None,
        }
    }

    /// Destroyed and sold are absorbing: nothing transitions out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Destroyed | BatchStatus::Sold)
    }

    /// Transition table for the lifecycle state machine. Every non-terminal
    /// status may move to any other status; the terminal pair accepts no
    /// exits, and a status never transitions to itself.
    pub fn can_transition_to(&self, new: BatchStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self != new
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Active => write!(f, "Active"),
            BatchStatus::OnHold => write!(f, "On Hold"),
            BatchStatus::Quarantine => write!(f, "Quarantine"),
            BatchStatus::Released => write!(f, "Released"),
            BatchStatus::InTransit => write!(f, "In Transit"),
            BatchStatus::Destroyed => write!(f, "Destroyed"),
            BatchStatus::Sold => write!(f, "Sold"),
            BatchStatus::Archived => write!(f, "Archived"),
        }
    }
}

/// Flag side effects of a status transition. `None` means leave the flag
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagChanges {
    pub set_archived: Option<bool>,
    pub set_recalled: Option<bool>,
}

/// Derive the archived/recalled flag changes implied by a status transition.
/// This is the single source of those side effects: entering `archived`
/// raises the archive flag and leaving it clears it; entering `quarantine`
/// raises the recall flag and leaving it clears it. The caller applies the
/// changes (and their timestamps) in the same transaction as the status
/// update.
pub fn derive_flags(old: BatchStatus, new: BatchStatus) -> FlagChanges {
    let mut changes = FlagChanges::default();

    if new == BatchStatus::Archived && old != BatchStatus::Archived {
        changes.set_archived = Some(true);
    } else if old == BatchStatus::Archived && new != BatchStatus::Archived {
        changes.set_archived = Some(false);
    }

    if new == BatchStatus::Quarantine && old != BatchStatus::Quarantine {
        changes.set_recalled = Some(true);
    } else if old == BatchStatus::Quarantine && new != BatchStatus::Quarantine {
        changes.set_recalled = Some(false);
    }

    changes
}

/// Generate a batch code: CCP-YYYY-SITE-NNNN
pub fn generate_batch_code(site_code: &str, year: i32, sequence: i32) -> String {
    format!("CCP-{}-{}-{:04}", year, site_code, sequence)
}
