//! Regulatory report generation
//!
//! Pulls facility metadata, inventory snapshots, and in-range ledger events
//! out of the store and hands them to the pure builders in `shared`. The
//! service decides what feeds the report; the shared schema decides what
//! the regulator sees.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use shared::{
    build_disposition_report, build_monthly_inventory, build_production_report, DateRange,
    EventType, InventorySnapshotRecord, LedgerEventRecord, ProductCategory, ReportDocument,
    ReportMetadata, ReportType, UnitOfMeasure,
};

/// Report generator backed by the ledger and batch projections
#[derive(Clone)]
pub struct ComplianceReportService {
    db: PgPool,
}

impl ComplianceReportService {
    /// Create a new ComplianceReportService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Generate a report for a facility and period. A facility without a
    /// tenant association is a provisioning fault: generation fails loudly
    /// instead of producing an empty report.
    pub async fn generate(
        &self,
        scope: TenantScope,
        report_type: ReportType,
        facility_id: Uuid,
        range: DateRange,
    ) -> AppResult<ReportDocument> {
        if range.end < range.start {
            return Err(AppError::Validation {
                field: "end_date".to_string(),
                message: "End date must not be before start date".to_string(),
                message_fr: "La date de fin ne doit pas précéder la date de début".to_string(),
            });
        }

        let facility = sqlx::query_as::<
            _,
            (Option<Uuid>, String, String, String, String, String, String),
        >(
            r#"
            SELECT tenant_id, licence_number, name, address, city, province, postal_code
            FROM facilities
            WHERE id = $1 AND (tenant_id = $2 OR $3)
            "#,
        )
        .bind(facility_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Facility".to_string()))?;

        if facility.0.is_none() {
            return Err(AppError::Configuration(format!(
                "Facility {} has no tenant association",
                facility_id
            )));
        }

        let meta = ReportMetadata {
            licence_number: facility.1,
            facility_name: facility.2,
            address: facility.3,
            city: facility.4,
            province: facility.5,
            postal_code: facility.6,
            period_year: range.start.year(),
            period_month: range.start.month(),
        };

        let document = match report_type {
            ReportType::MonthlyInventory => {
                let opening = self
                    .inventory_snapshot(scope, facility_id, range.start, false)
                    .await?;
                let closing = self
                    .inventory_snapshot(scope, facility_id, range.end, true)
                    .await?;
                let events = self.ledger_records(scope, facility_id, range).await?;
                build_monthly_inventory(&meta, &opening, &closing, &events)
            }
            ReportType::Production => {
                let events = self.ledger_records(scope, facility_id, range).await?;
                build_production_report(&meta, &events)
            }
            ReportType::Disposition => {
                let events = self.ledger_records(scope, facility_id, range).await?;
                build_disposition_report(&meta, &events)
            }
        };

        tracing::info!(
            facility_id = %facility_id,
            report_type = %report_type.as_str(),
            rows = document.rows.len(),
            "Report generated"
        );
        Ok(document)
    }

    /// Render a report document as CSV (the transport format; the
    /// aggregation above is format-agnostic).
    pub fn to_csv(document: &ReportDocument) -> AppResult<String> {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(&document.headers)
            .map_err(|e| AppError::Internal(format!("CSV write error: {}", e)))?;
        for row in &document.rows {
            writer
                .write_record(row)
                .map_err(|e| AppError::Internal(format!("CSV write error: {}", e)))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV flush error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV encoding error: {}", e)))
    }

    /// Inventory snapshot at a boundary: batches created strictly before the
    /// date for opening cells, at or before it for closing cells.
    async fn inventory_snapshot(
        &self,
        scope: TenantScope,
        facility_id: Uuid,
        as_of: NaiveDate,
        inclusive: bool,
    ) -> AppResult<Vec<InventorySnapshotRecord>> {
        let comparison = if inclusive { "<=" } else { "<" };
        let query = format!(
            r#"
            SELECT product_category, is_packaged, current_units, unit
            FROM batches
            WHERE facility_id = $1
              AND (tenant_id = $2 OR $3)
              AND created_at::date {comparison} $4
            "#
        );

        let rows = sqlx::query_as::<_, (String, bool, Decimal, String)>(&query)
            .bind(facility_id)
            .bind(scope.tenant_id)
            .bind(scope.privileged)
            .bind(as_of)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter()
            .map(|(category, is_packaged, quantity, unit)| {
                let category = ProductCategory::from_str(&category).ok_or_else(|| {
                    AppError::Internal(format!("Unknown product category: {}", category))
                })?;
                let unit = UnitOfMeasure::from_str(&unit).ok_or_else(|| {
                    AppError::Internal(format!("Unknown unit of measure: {}", unit))
                })?;
                Ok(InventorySnapshotRecord {
                    category,
                    is_packaged,
                    quantity,
                    unit,
                })
            })
            .collect()
    }

    /// In-range ledger events joined with their batch's product identity,
    /// in replay order.
    async fn ledger_records(
        &self,
        scope: TenantScope,
        facility_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<LedgerEventRecord>> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                chrono::DateTime<chrono::Utc>,
                String,
                String,
                String,
                bool,
                Option<Decimal>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                Uuid,
            ),
        >(
            r#"
            SELECT e.event_type, e.occurred_at, b.batch_code, b.product_type,
                   b.product_category, b.is_packaged, e.quantity, e.unit,
                   e.from_location, e.to_location, e.description, e.user_id
            FROM traceability_events e
            JOIN batches b ON b.id = e.batch_id
            WHERE e.facility_id = $1
              AND (e.tenant_id = $2 OR $3)
              AND e.occurred_at::date BETWEEN $4 AND $5
            ORDER BY e.occurred_at ASC, e.seq ASC
            "#,
        )
        .bind(facility_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(
                |(
                    event_type,
                    occurred_at,
                    batch_code,
                    product_type,
                    category,
                    is_packaged,
                    quantity,
                    unit,
                    from_location,
                    to_location,
                    description,
                    recorded_by,
                )| {
                    let event_type = EventType::from_str(&event_type).ok_or_else(|| {
                        AppError::Internal(format!("Unknown ledger event type: {}", event_type))
                    })?;
                    let category = ProductCategory::from_str(&category).ok_or_else(|| {
                        AppError::Internal(format!("Unknown product category: {}", category))
                    })?;
                    let unit = match unit {
                        Some(ref u) => Some(UnitOfMeasure::from_str(u).ok_or_else(|| {
                            AppError::Internal(format!("Unknown unit of measure: {}", u))
                        })?),
                        None => None,
                    };
                    Ok(LedgerEventRecord {
                        event_type,
                        occurred_at,
                        batch_code,
                        product_type,
                        category,
                        is_packaged,
                        quantity,
                        unit,
                        from_location,
                        to_location,
                        description,
                        recorded_by,
                    })
                },
            )
            .collect()
    }
}
