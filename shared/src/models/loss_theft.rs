//! Loss/theft incident records and detection thresholds
//!
//! Two distinct threshold tables live here. The detection table decides when
//! a reconciliation shortage automatically opens an incident report; it is
//! operational policy and can be tuned through configuration. The Health
//! Canada table decides when an existing incident must be reported to the
//! regulator; it is fixed regulatory data. Both express mass in grams and
//! counts in whole units.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_for_threshold, ProductCategory, UnitOfMeasure};

/// Incident classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Loss,
    Theft,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Loss => "loss",
            IncidentType::Theft => "theft",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "loss" => Some(IncidentType::Loss),
            "theft" => Some(IncidentType::Theft),
            _ => None,
        }
    }
}

/// Investigation workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Open,
    UnderInvestigation,
    Closed,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Open => "open",
            InvestigationStatus::UnderInvestigation => "under_investigation",
            InvestigationStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(InvestigationStatus::Open),
            "under_investigation" => Some(InvestigationStatus::UnderInvestigation),
            "closed" => Some(InvestigationStatus::Closed),
            _ => None,
        }
    }
}

/// A regulatory loss/theft incident record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossTheftReport {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub facility_id: Uuid,
    /// Present when the incident traces to a specific batch
    pub batch_id: Option<Uuid>,
    pub incident_type: IncidentType,
    pub product_category: ProductCategory,
    pub product_type: String,
    pub quantity_lost: Decimal,
    pub unit: UnitOfMeasure,
    pub estimated_value: Option<Decimal>,
    pub incident_date: NaiveDate,
    pub discovered_date: NaiveDate,
    pub location: Option<String>,
    pub description: String,
    pub investigation_status: InvestigationStatus,
    pub investigation_notes: Option<String>,
    pub police_notified: bool,
    pub police_report_number: Option<String>,
    /// Once true, the core incident facts are frozen
    pub reported_to_health_canada: bool,
    pub hc_confirmation_number: Option<String>,
    pub hc_submitted_at: Option<DateTime<Utc>>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LossTheftReport {
    pub fn is_submitted(&self) -> bool {
        self.reported_to_health_canada
    }
}

/// Automatic-detection trigger for one product category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryThreshold {
    /// Grams for mass categories, whole units for count categories
    pub min_quantity: Decimal,
    pub min_percentage: Decimal,
}

/// Detection thresholds by product category, with a fallback for anything
/// not listed. The defaults are the standing operational policy; deployments
/// override the fallback through configuration.
#[derive(Debug, Clone)]
pub struct DetectionThresholds {
    per_category: HashMap<ProductCategory, CategoryThreshold>,
    fallback: CategoryThreshold,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        let two_percent = Decimal::from(2);
        let entries = [
            (ProductCategory::Seeds, 25),
            (ProductCategory::VegetativePlants, 10),
            (ProductCategory::WholePlants, 5),
            (ProductCategory::FreshCannabis, 1000),
            (ProductCategory::DriedCannabis, 250),
            (ProductCategory::CannabisOil, 250),
            (ProductCategory::ExtractsInhaled, 100),
            (ProductCategory::ExtractsIngested, 100),
            (ProductCategory::ExtractsOther, 100),
            (ProductCategory::EdiblesSolid, 500),
            (ProductCategory::EdiblesNonSolid, 500),
            (ProductCategory::Topicals, 500),
        ];
        let per_category = entries
            .into_iter()
            .map(|(category, quantity)| {
                (
                    category,
                    CategoryThreshold {
                        min_quantity: Decimal::from(quantity),
                        min_percentage: two_percent,
                    },
                )
            })
            .collect();
        Self {
            per_category,
            fallback: CategoryThreshold {
                min_quantity: Decimal::from(100),
                min_percentage: two_percent,
            },
        }
    }
}

impl DetectionThresholds {
    /// Standing table with the fallback replaced by configured values.
    pub fn with_fallback(min_quantity: Decimal, min_percentage: Decimal) -> Self {
        Self {
            fallback: CategoryThreshold {
                min_quantity,
                min_percentage,
            },
            ..Self::default()
        }
    }

    pub fn threshold_for(&self, category: ProductCategory) -> CategoryThreshold {
        self.per_category
            .get(&category)
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Decide whether a shortage warrants an automatic incident report. The
/// shortage is expressed in the batch's unit of measure; comparison happens
/// in threshold units (grams / whole units). Overages and zero shortages
/// never trigger.
pub fn should_auto_report(
    category: ProductCategory,
    shortage: Decimal,
    shortage_percentage: Decimal,
    unit: UnitOfMeasure,
    thresholds: &DetectionThresholds,
) -> bool {
    if shortage <= Decimal::ZERO {
        return false;
    }
    let threshold = thresholds.threshold_for(category);
    let normalized = normalize_for_threshold(shortage, unit);
    normalized >= threshold.min_quantity || shortage_percentage >= threshold.min_percentage
}

/// Health Canada reporting thresholds by category: grams for mass
/// categories, whole units for count categories. Fixed regulatory data.
const HC_REPORTING_THRESHOLDS: &[(ProductCategory, i64)] = &[
    (ProductCategory::Seeds, 50),
    (ProductCategory::VegetativePlants, 20),
    (ProductCategory::WholePlants, 10),
    (ProductCategory::FreshCannabis, 5000),
    (ProductCategory::DriedCannabis, 1000),
    (ProductCategory::CannabisOil, 1000),
    (ProductCategory::ExtractsInhaled, 500),
    (ProductCategory::ExtractsIngested, 500),
    (ProductCategory::ExtractsOther, 500),
    (ProductCategory::EdiblesSolid, 2000),
    (ProductCategory::EdiblesNonSolid, 2000),
    (ProductCategory::Topicals, 2000),
];

/// Health Canada reporting threshold for a category.
pub fn hc_reporting_threshold(category: ProductCategory) -> Decimal {
    HC_REPORTING_THRESHOLDS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, quantity)| Decimal::from(*quantity))
        .unwrap_or(Decimal::ZERO)
}

/// Whether an incident must be reported to Health Canada: theft always;
/// loss when the quantity lost meets the category's reporting threshold.
pub fn requires_health_canada_reporting(report: &LossTheftReport) -> bool {
    if report.incident_type == IncidentType::Theft {
        return true;
    }
    let normalized = normalize_for_threshold(report.quantity_lost, report.unit);
    normalized >= hc_reporting_threshold(report.product_category)
}
