//! Regulatory report schema and aggregation
//!
//! The monthly inventory report is a single wide row whose ~270 columns are
//! dictated by the regulator and parsed by position downstream. The schema
//! is generated from the cross product of packaged state x product category
//! x metric rather than written out literally, so column order can never
//! drift from the mapping logic. Production and disposition reports are
//! per-event listings with fixed column sets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    normalize_for_report, EventType, ProductCategory, UnitClass, UnitOfMeasure,
};

/// Report types accepted by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    MonthlyInventory,
    Production,
    Disposition,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::MonthlyInventory => "monthly_inventory",
            ReportType::Production => "production",
            ReportType::Disposition => "disposition",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "monthly_inventory" => Some(ReportType::MonthlyInventory),
            "production" => Some(ReportType::Production),
            "disposition" => Some(ReportType::Disposition),
            _ => None,
        }
    }
}

/// Packaged dimension of the monthly inventory schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagedState {
    Unpackaged,
    Packaged,
}

impl PackagedState {
    pub const ALL: [PackagedState; 2] = [PackagedState::Unpackaged, PackagedState::Packaged];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackagedState::Unpackaged => "unpackaged",
            PackagedState::Packaged => "packaged",
        }
    }

    pub fn from_flag(is_packaged: bool) -> Self {
        if is_packaged {
            PackagedState::Packaged
        } else {
            PackagedState::Unpackaged
        }
    }
}

/// The eleven metric columns per packaged state and category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryMetric {
    OpeningInventory,
    Produced,
    Received,
    Processed,
    ShippedDomestic,
    Exported,
    Destroyed,
    LostStolen,
    OtherReductions,
    OtherAdditions,
    ClosingInventory,
}

impl InventoryMetric {
    pub const ALL: [InventoryMetric; 11] = [
        InventoryMetric::OpeningInventory,
        InventoryMetric::Produced,
        InventoryMetric::Received,
        InventoryMetric::Processed,
        InventoryMetric::ShippedDomestic,
        InventoryMetric::Exported,
        InventoryMetric::Destroyed,
        InventoryMetric::LostStolen,
        InventoryMetric::OtherReductions,
        InventoryMetric::OtherAdditions,
        InventoryMetric::ClosingInventory,
    ];

    pub fn column_suffix(&self) -> &'static str {
        match self {
            InventoryMetric::OpeningInventory => "opening_inventory",
            InventoryMetric::Produced => "quantity_produced",
            InventoryMetric::Received => "quantity_received",
            InventoryMetric::Processed => "quantity_processed",
            InventoryMetric::ShippedDomestic => "quantity_shipped_domestic",
            InventoryMetric::Exported => "quantity_exported",
            InventoryMetric::Destroyed => "quantity_destroyed",
            InventoryMetric::LostStolen => "quantity_lost_stolen",
            InventoryMetric::OtherReductions => "other_reductions",
            InventoryMetric::OtherAdditions => "other_additions",
            InventoryMetric::ClosingInventory => "closing_inventory",
        }
    }
}

/// Map a ledger event type onto its monthly inventory column. Split,
/// movement, and pure state events carry no inventory meaning for the
/// regulator and map to no column. Exports and other additions have no
/// driving event type in the ledger taxonomy; their columns stay zero.
pub fn metric_for_event(event_type: EventType) -> Option<InventoryMetric> {
    match event_type {
        EventType::Harvest => Some(InventoryMetric::Produced),
        EventType::Delivery => Some(InventoryMetric::Received),
        EventType::Processing => Some(InventoryMetric::Processed),
        EventType::Shipment | EventType::OrderFulfillment => {
            Some(InventoryMetric::ShippedDomestic)
        }
        EventType::Destruction => Some(InventoryMetric::Destroyed),
        EventType::LossTheft => Some(InventoryMetric::LostStolen),
        EventType::AdjustmentLoss => Some(InventoryMetric::OtherReductions),
        EventType::Split
        | EventType::Movement
        | EventType::Archive
        | EventType::Restore
        | EventType::Recall
        | EventType::RecallRemoved
        | EventType::StatusChange => None,
    }
}

/// Facility and period metadata carried in the report header columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub licence_number: String,
    pub facility_name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub period_year: i32,
    pub period_month: u32,
}

/// Batch snapshot feeding opening/closing inventory cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshotRecord {
    pub category: ProductCategory,
    pub is_packaged: bool,
    pub quantity: Decimal,
    pub unit: UnitOfMeasure,
}

/// Ledger event view feeding the in-range report cells and listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEventRecord {
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub batch_code: String,
    pub product_type: String,
    pub category: ProductCategory,
    pub is_packaged: bool,
    pub quantity: Option<Decimal>,
    pub unit: Option<UnitOfMeasure>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub description: Option<String>,
    pub recorded_by: Uuid,
}

/// A generated tabular report: headers first, then data rows. Column sets
/// are fixed per report type and never reordered between calls.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

const METADATA_HEADERS: [&str; 8] = [
    "licence_number",
    "facility_name",
    "address",
    "city",
    "province",
    "postal_code",
    "period_year",
    "period_month",
];

/// Column headers of the monthly inventory report, generated in a stable
/// order: metadata, then unpackaged before packaged, categories in
/// regulatory order, the eleven metrics per category.
pub fn monthly_inventory_headers() -> Vec<String> {
    let mut headers: Vec<String> = METADATA_HEADERS.iter().map(|h| h.to_string()).collect();
    for state in PackagedState::ALL {
        for category in ProductCategory::ALL {
            for metric in InventoryMetric::ALL {
                headers.push(format!(
                    "{}_{}_{}",
                    state.as_str(),
                    category.as_str(),
                    metric.column_suffix()
                ));
            }
        }
    }
    headers
}

/// Format a numeric cell: mass categories to four decimal places in
/// kilograms, count categories as whole units.
pub fn format_cell(value: Decimal, class: UnitClass) -> String {
    match class {
        UnitClass::Mass => format!("{:.4}", value.round_dp(4)),
        UnitClass::Count => format!("{:.0}", value.round_dp(0)),
    }
}

/// Build the monthly inventory report: exactly one data row. Opening cells
/// come from batches existing before the period, closing cells from batches
/// existing at or before its end, movement cells from replaying in-range
/// ledger events through `metric_for_event`. Every cell defaults to zero.
pub fn build_monthly_inventory(
    meta: &ReportMetadata,
    opening: &[InventorySnapshotRecord],
    closing: &[InventorySnapshotRecord],
    events: &[LedgerEventRecord],
) -> ReportDocument {
    let mut cells: HashMap<(PackagedState, ProductCategory, InventoryMetric), Decimal> =
        HashMap::new();

    for snapshot in opening {
        let key = (
            PackagedState::from_flag(snapshot.is_packaged),
            snapshot.category,
            InventoryMetric::OpeningInventory,
        );
        *cells.entry(key).or_default() += normalize_for_report(snapshot.quantity, snapshot.unit);
    }
    for snapshot in closing {
        let key = (
            PackagedState::from_flag(snapshot.is_packaged),
            snapshot.category,
            InventoryMetric::ClosingInventory,
        );
        *cells.entry(key).or_default() += normalize_for_report(snapshot.quantity, snapshot.unit);
    }
    for event in events {
        let Some(metric) = metric_for_event(event.event_type) else {
            continue;
        };
        let (Some(quantity), Some(unit)) = (event.quantity, event.unit) else {
            continue;
        };
        let key = (
            PackagedState::from_flag(event.is_packaged),
            event.category,
            metric,
        );
        *cells.entry(key).or_default() += normalize_for_report(quantity, unit);
    }

    let mut row: Vec<String> = vec![
        meta.licence_number.clone(),
        meta.facility_name.clone(),
        meta.address.clone(),
        meta.city.clone(),
        meta.province.clone(),
        meta.postal_code.clone(),
        meta.period_year.to_string(),
        meta.period_month.to_string(),
    ];
    for state in PackagedState::ALL {
        for category in ProductCategory::ALL {
            for metric in InventoryMetric::ALL {
                let value = cells
                    .get(&(state, category, metric))
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                row.push(format_cell(value, category.unit_class()));
            }
        }
    }

    ReportDocument {
        headers: monthly_inventory_headers(),
        rows: vec![row],
    }
}

pub const PRODUCTION_HEADERS: [&str; 10] = [
    "licence_number",
    "event_date",
    "event_type",
    "batch_code",
    "product_type",
    "product_category",
    "quantity",
    "unit",
    "normalized_quantity",
    "recorded_by",
];

pub const DISPOSITION_HEADERS: [&str; 13] = [
    "licence_number",
    "event_date",
    "event_type",
    "batch_code",
    "product_type",
    "product_category",
    "quantity",
    "unit",
    "normalized_quantity",
    "from_location",
    "to_location",
    "reason",
    "recorded_by",
];

fn quantity_cells(event: &LedgerEventRecord) -> (String, String, String) {
    match (event.quantity, event.unit) {
        (Some(quantity), Some(unit)) => (
            quantity.to_string(),
            unit.as_str().to_string(),
            format_cell(
                normalize_for_report(quantity, unit),
                event.category.unit_class(),
            ),
        ),
        _ => (String::new(), String::new(), String::new()),
    }
}

/// Build the production report: one row per harvest or processing event.
pub fn build_production_report(
    meta: &ReportMetadata,
    events: &[LedgerEventRecord],
) -> ReportDocument {
    let rows = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::Harvest | EventType::Processing))
        .map(|event| {
            let (quantity, unit, normalized) = quantity_cells(event);
            vec![
                meta.licence_number.clone(),
                event.occurred_at.date_naive().to_string(),
                event.event_type.as_str().to_string(),
                event.batch_code.clone(),
                event.product_type.clone(),
                event.category.as_str().to_string(),
                quantity,
                unit,
                normalized,
                event.recorded_by.to_string(),
            ]
        })
        .collect();

    ReportDocument {
        headers: PRODUCTION_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// Build the disposition report: one row per movement, destruction, or
/// loss/theft event, with locations and reason.
pub fn build_disposition_report(
    meta: &ReportMetadata,
    events: &[LedgerEventRecord],
) -> ReportDocument {
    let rows = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                EventType::Movement | EventType::Destruction | EventType::LossTheft
            )
        })
        .map(|event| {
            let (quantity, unit, normalized) = quantity_cells(event);
            vec![
                meta.licence_number.clone(),
                event.occurred_at.date_naive().to_string(),
                event.event_type.as_str().to_string(),
                event.batch_code.clone(),
                event.product_type.clone(),
                event.category.as_str().to_string(),
                quantity,
                unit,
                normalized,
                event.from_location.clone().unwrap_or_default(),
                event.to_location.clone().unwrap_or_default(),
                event.description.clone().unwrap_or_default(),
                event.recorded_by.to_string(),
            ]
        })
        .collect();

    ReportDocument {
        headers: DISPOSITION_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}
