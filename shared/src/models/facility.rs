//! Facility, cultivation area, and lookup records
//!
//! These records are owned by the surrounding CRUD layer; the compliance
//! core only reads them (capacity checks, report headers, justification
//! reasons).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnitOfMeasure;

/// A licensed site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,
    /// A facility without a tenant association cannot generate reports
    pub tenant_id: Option<Uuid>,
    pub licence_number: String,
    pub site_code: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub created_at: DateTime<Utc>,
}

/// A cultivation area within a facility, with a hard capacity limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CultivationArea {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    pub capacity_units: Decimal,
    pub unit: UnitOfMeasure,
    pub created_at: DateTime<Utc>,
}

/// A named justification reason for reconciliation discrepancies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyReason {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}
