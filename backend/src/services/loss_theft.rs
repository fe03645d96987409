//! Loss/theft incident reports and automatic shortage detection
//!
//! Incidents enter the system two ways: staff file them directly, or the
//! reconciliation flow opens one automatically when an unexplained shortage
//! crosses the detection thresholds. The automatic path runs inside the
//! justification transaction so the incident, its ledger event, and the
//! inventory adjustment commit together.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use crate::services::batch::BatchService;
use crate::services::traceability::{NewEvent, TraceabilityService};
use shared::{
    discrepancy, discrepancy_percentage, hc_reporting_threshold,
    requires_health_canada_reporting, should_auto_report, validate_unit_for_category, Batch,
    DetectionThresholds, EventType, IncidentType, InvestigationStatus, LossTheftReport,
    ProductCategory, UnitOfMeasure,
};

/// Incident report service with the detection threshold table
#[derive(Clone)]
pub struct LossTheftService {
    db: PgPool,
    thresholds: DetectionThresholds,
}

const REPORT_COLUMNS: &str =
    "id, tenant_id, facility_id, batch_id, incident_type, product_category, product_type, \
     quantity_lost, unit, estimated_value, incident_date, discovered_date, location, \
     description, investigation_status, investigation_notes, police_notified, \
     police_report_number, reported_to_health_canada, hc_confirmation_number, hc_submitted_at, \
     reported_by, created_at, updated_at";

/// Database row for an incident report
#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    tenant_id: Uuid,
    facility_id: Uuid,
    batch_id: Option<Uuid>,
    incident_type: String,
    product_category: String,
    product_type: String,
    quantity_lost: Decimal,
    unit: String,
    estimated_value: Option<Decimal>,
    incident_date: NaiveDate,
    discovered_date: NaiveDate,
    location: Option<String>,
    description: String,
    investigation_status: String,
    investigation_notes: Option<String>,
    police_notified: bool,
    police_report_number: Option<String>,
    reported_to_health_canada: bool,
    hc_confirmation_number: Option<String>,
    hc_submitted_at: Option<DateTime<Utc>>,
    reported_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_report(self) -> AppResult<LossTheftReport> {
        let incident_type = IncidentType::from_str(&self.incident_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown incident type: {}", self.incident_type))
        })?;
        let product_category = ProductCategory::from_str(&self.product_category).ok_or_else(|| {
            AppError::Internal(format!("Unknown product category: {}", self.product_category))
        })?;
        let unit = UnitOfMeasure::from_str(&self.unit)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", self.unit)))?;
        let investigation_status = InvestigationStatus::from_str(&self.investigation_status)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Unknown investigation status: {}",
                    self.investigation_status
                ))
            })?;

        Ok(LossTheftReport {
            id: self.id,
            tenant_id: self.tenant_id,
            facility_id: self.facility_id,
            batch_id: self.batch_id,
            incident_type,
            product_category,
            product_type: self.product_type,
            quantity_lost: self.quantity_lost,
            unit,
            estimated_value: self.estimated_value,
            incident_date: self.incident_date,
            discovered_date: self.discovered_date,
            location: self.location,
            description: self.description,
            investigation_status,
            investigation_notes: self.investigation_notes,
            police_notified: self.police_notified,
            police_report_number: self.police_report_number,
            reported_to_health_canada: self.reported_to_health_canada,
            hc_confirmation_number: self.hc_confirmation_number,
            hc_submitted_at: self.hc_submitted_at,
            reported_by: self.reported_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for filing an incident report directly
#[derive(Debug, Deserialize)]
pub struct CreateReportInput {
    pub facility_id: Uuid,
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
    pub police_notified: Option<bool>,
    pub police_report_number: Option<String>,
}

/// Core incident fact updates; rejected once the report has been submitted
#[derive(Debug, Deserialize)]
pub struct UpdateReportInput {
    pub incident_type: Option<IncidentType>,
    pub quantity_lost: Option<Decimal>,
    pub estimated_value: Option<Decimal>,
    pub incident_date: Option<NaiveDate>,
    pub discovered_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Investigation updates; allowed at any time, including after submission
#[derive(Debug, Deserialize)]
pub struct UpdateInvestigationInput {
    pub investigation_status: Option<InvestigationStatus>,
    pub investigation_notes: Option<String>,
    pub police_notified: Option<bool>,
    pub police_report_number: Option<String>,
}

/// Input for recording a Health Canada submission
#[derive(Debug, Deserialize)]
pub struct HcSubmissionInput {
    pub confirmation_number: Option<String>,
}

/// Input for an ad-hoc shortage analysis against a batch
#[derive(Debug, Deserialize)]
pub struct AnalyzeShortageInput {
    pub actual_quantity: Decimal,
    pub reason: String,
}

/// List filter for incident reports
#[derive(Debug, Default)]
pub struct ReportFilter {
    pub facility_id: Option<Uuid>,
    pub incident_type: Option<IncidentType>,
    pub investigation_status: Option<InvestigationStatus>,
}

/// Whether an incident crosses the Health Canada reporting bar
#[derive(Debug, Serialize)]
pub struct HcReportability {
    pub required: bool,
    /// Category threshold in grams (mass) or whole units (counts)
    pub threshold: Decimal,
}

impl LossTheftService {
    /// Create a new LossTheftService instance with the standing detection
    /// thresholds
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            thresholds: DetectionThresholds::default(),
        }
    }

    /// Create a service whose fallback thresholds come from configuration
    pub fn with_thresholds(db: PgPool, thresholds: DetectionThresholds) -> Self {
        Self { db, thresholds }
    }

    /// Run shortage analysis for a batch against an observed quantity. A
    /// qualifying shortage opens an incident, appends the `loss_theft`
    /// ledger event, and adjusts the batch down to the observed quantity,
    /// all in one transaction. Returns None when nothing qualifies.
    pub async fn analyze(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: AnalyzeShortageInput,
    ) -> AppResult<Option<LossTheftReport>> {
        if input.actual_quantity < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "actual_quantity".to_string(),
                message: "Counted quantity cannot be negative".to_string(),
                message_fr: "La quantité comptée ne peut pas être négative".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let batch = BatchService::lock_batch(&mut tx, scope, batch_id).await?;
        BatchService::ensure_mutable(&batch)?;

        let report = Self::analyze_shortage(
            &mut tx,
            &self.thresholds,
            &batch,
            batch.current_units,
            input.actual_quantity,
            &input.reason,
            user_id,
        )
        .await?;

        tx.commit().await?;
        Ok(report)
    }

    /// Threshold check and incident creation inside the caller's
    /// transaction. The caller holds the batch row lock. Overages and
    /// sub-threshold shortages produce nothing; the caller's own flow (for
    /// reconciliation, the justification write) proceeds either way.
    pub(crate) async fn analyze_shortage(
        tx: &mut Transaction<'_, Postgres>,
        thresholds: &DetectionThresholds,
        batch: &Batch,
        expected_quantity: Decimal,
        actual_quantity: Decimal,
        reason_label: &str,
        user_id: Uuid,
    ) -> AppResult<Option<LossTheftReport>> {
        let shortage = discrepancy(expected_quantity, actual_quantity);
        if shortage <= Decimal::ZERO {
            return Ok(None);
        }

        let percentage = discrepancy_percentage(expected_quantity, actual_quantity);
        if !should_auto_report(
            batch.product_category,
            shortage,
            percentage,
            batch.unit,
            thresholds,
        ) {
            return Ok(None);
        }

        let today = Utc::now().date_naive();
        let description = format!(
            "Automatic report: unexplained shortage of {} {} ({}%) found during reconciliation of batch {}. Stated reason: {}",
            shortage,
            batch.unit.as_str(),
            percentage.round_dp(2),
            batch.batch_code,
            reason_label
        );

        let insert_query = format!(
            r#"
            INSERT INTO loss_theft_reports (
                tenant_id, facility_id, batch_id, incident_type, product_category, product_type,
                quantity_lost, unit, incident_date, discovered_date, location, description,
                reported_by
            )
            VALUES ($1, $2, $3, 'loss', $4, $5, $6, $7, $8, $8, $9, $10, $11)
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let report = sqlx::query_as::<_, ReportRow>(&insert_query)
            .bind(batch.tenant_id)
            .bind(batch.facility_id)
            .bind(batch.id)
            .bind(batch.product_category.as_str())
            .bind(&batch.product_type)
            .bind(shortage)
            .bind(batch.unit.as_str())
            .bind(today)
            .bind(&batch.sub_location)
            .bind(&description)
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?
            .into_report()?;

        let event = NewEvent {
            quantity: Some(shortage),
            unit: Some(batch.unit),
            description: Some(format!(
                "Unexplained shortage detected during reconciliation: {}",
                reason_label
            )),
            reference_type: Some("loss_theft_report".to_string()),
            reference_id: Some(report.id.to_string()),
            ..NewEvent::for_batch(batch, EventType::LossTheft, user_id)
        };
        TraceabilityService::append(tx, event).await?;

        // Bring the projection down to the observed quantity so the ledger
        // and the cached units stay in agreement.
        sqlx::query("UPDATE batches SET current_units = $1 WHERE id = $2")
            .bind(actual_quantity)
            .bind(batch.id)
            .execute(&mut **tx)
            .await?;

        tracing::warn!(
            batch_id = %batch.id,
            batch_code = %batch.batch_code,
            shortage = %shortage,
            report_id = %report.id,
            "Loss/theft incident opened automatically"
        );
        Ok(Some(report))
    }

    /// File an incident report directly. Linking a batch deducts the lost
    /// quantity and appends the `loss_theft` ledger event in the same
    /// transaction.
    pub async fn create_report(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        input: CreateReportInput,
    ) -> AppResult<LossTheftReport> {
        if input.quantity_lost <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "quantity_lost".to_string(),
                message: "Quantity lost must be greater than zero".to_string(),
                message_fr: "La quantité perdue doit être supérieure à zéro".to_string(),
            });
        }
        if input.discovered_date < input.incident_date {
            return Err(AppError::Validation {
                field: "discovered_date".to_string(),
                message: "An incident cannot be discovered before it occurred".to_string(),
                message_fr: "Un incident ne peut pas être découvert avant de s'être produit"
                    .to_string(),
            });
        }
        if input.description.trim().is_empty() {
            return Err(AppError::Validation {
                field: "description".to_string(),
                message: "Description cannot be empty".to_string(),
                message_fr: "La description ne peut pas être vide".to_string(),
            });
        }
        if let Err(msg) = validate_unit_for_category(input.product_category, input.unit) {
            return Err(AppError::Validation {
                field: "unit".to_string(),
                message: msg.to_string(),
                message_fr: "L'unité de mesure ne correspond pas à la catégorie de produit"
                    .to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let facility_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM facilities WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(input.facility_id)
        .bind(scope.tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        if !facility_exists {
            return Err(AppError::NotFound("Facility".to_string()));
        }

        let batch = match input.batch_id {
            Some(batch_id) => {
                let batch = BatchService::lock_batch(&mut tx, scope, batch_id).await?;
                BatchService::ensure_mutable(&batch)?;
                if batch.unit != input.unit {
                    return Err(AppError::Validation {
                        field: "unit".to_string(),
                        message: "Unit must match the linked batch".to_string(),
                        message_fr: "L'unité doit correspondre à celle du lot lié".to_string(),
                    });
                }
                if batch.product_category != input.product_category {
                    return Err(AppError::Validation {
                        field: "product_category".to_string(),
                        message: "Product category must match the linked batch".to_string(),
                        message_fr: "La catégorie de produit doit correspondre à celle du lot lié"
                            .to_string(),
                    });
                }
                if input.quantity_lost > batch.current_units {
                    return Err(AppError::InsufficientQuantity {
                        available: batch.current_units,
                        requested: input.quantity_lost,
                    });
                }
                Some(batch)
            }
            None => None,
        };

        let insert_query = format!(
            r#"
            INSERT INTO loss_theft_reports (
                tenant_id, facility_id, batch_id, incident_type, product_category, product_type,
                quantity_lost, unit, estimated_value, incident_date, discovered_date, location,
                description, police_notified, police_report_number, reported_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let report = sqlx::query_as::<_, ReportRow>(&insert_query)
            .bind(scope.tenant_id)
            .bind(input.facility_id)
            .bind(input.batch_id)
            .bind(input.incident_type.as_str())
            .bind(input.product_category.as_str())
            .bind(&input.product_type)
            .bind(input.quantity_lost)
            .bind(input.unit.as_str())
            .bind(input.estimated_value)
            .bind(input.incident_date)
            .bind(input.discovered_date)
            .bind(&input.location)
            .bind(&input.description)
            .bind(input.police_notified.unwrap_or(false))
            .bind(&input.police_report_number)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .into_report()?;

        if let Some(batch) = batch {
            sqlx::query("UPDATE batches SET current_units = current_units - $1 WHERE id = $2")
                .bind(input.quantity_lost)
                .bind(batch.id)
                .execute(&mut *tx)
                .await?;

            let event = NewEvent {
                quantity: Some(input.quantity_lost),
                unit: Some(batch.unit),
                description: Some(input.description),
                reference_type: Some("loss_theft_report".to_string()),
                reference_id: Some(report.id.to_string()),
                ..NewEvent::for_batch(&batch, EventType::LossTheft, user_id)
            };
            TraceabilityService::append(&mut tx, event).await?;
        }

        tx.commit().await?;

        tracing::warn!(
            report_id = %report.id,
            incident_type = %report.incident_type.as_str(),
            quantity = %report.quantity_lost,
            "Loss/theft incident filed"
        );
        Ok(report)
    }

    /// Get an incident report by ID
    pub async fn get_report(
        &self,
        scope: TenantScope,
        report_id: Uuid,
    ) -> AppResult<LossTheftReport> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM loss_theft_reports WHERE id = $1 AND (tenant_id = $2 OR $3)"
        );

        sqlx::query_as::<_, ReportRow>(&query)
            .bind(report_id)
            .bind(scope.tenant_id)
            .bind(scope.privileged)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Loss/theft report".to_string()))?
            .into_report()
    }

    /// List incident reports for the tenant, newest first
    pub async fn list_reports(
        &self,
        scope: TenantScope,
        filter: ReportFilter,
    ) -> AppResult<Vec<LossTheftReport>> {
        let query = format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM loss_theft_reports
            WHERE (tenant_id = $1 OR $2)
              AND ($3::uuid IS NULL OR facility_id = $3)
              AND ($4::varchar IS NULL OR incident_type = $4)
              AND ($5::varchar IS NULL OR investigation_status = $5)
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, ReportRow>(&query)
            .bind(scope.tenant_id)
            .bind(scope.privileged)
            .bind(filter.facility_id)
            .bind(filter.incident_type.map(|t| t.as_str()))
            .bind(filter.investigation_status.map(|s| s.as_str()))
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(ReportRow::into_report).collect()
    }

    /// Update the core incident facts. Rejected once the report has been
    /// submitted to Health Canada; the submitted record is the regulatory
    /// record.
    pub async fn update_report(
        &self,
        scope: TenantScope,
        report_id: Uuid,
        input: UpdateReportInput,
    ) -> AppResult<LossTheftReport> {
        if let Some(quantity) = input.quantity_lost {
            if quantity <= Decimal::ZERO {
                return Err(AppError::Validation {
                    field: "quantity_lost".to_string(),
                    message: "Quantity lost must be greater than zero".to_string(),
                    message_fr: "La quantité perdue doit être supérieure à zéro".to_string(),
                });
            }
        }

        let mut tx = self.db.begin().await?;

        let existing = Self::lock_report(&mut tx, scope, report_id).await?;
        if existing.is_submitted() {
            return Err(AppError::Conflict {
                resource: "loss_theft_report".to_string(),
                message: "Report has been submitted to Health Canada and its core facts are frozen"
                    .to_string(),
                message_fr:
                    "Le rapport a été soumis à Santé Canada et ses faits fondamentaux sont verrouillés"
                        .to_string(),
            });
        }

        let incident_date = input.incident_date.unwrap_or(existing.incident_date);
        let discovered_date = input.discovered_date.unwrap_or(existing.discovered_date);
        if discovered_date < incident_date {
            return Err(AppError::Validation {
                field: "discovered_date".to_string(),
                message: "An incident cannot be discovered before it occurred".to_string(),
                message_fr: "Un incident ne peut pas être découvert avant de s'être produit"
                    .to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE loss_theft_reports
            SET incident_type = COALESCE($1, incident_type),
                quantity_lost = COALESCE($2, quantity_lost),
                estimated_value = COALESCE($3, estimated_value),
                incident_date = $4,
                discovered_date = $5,
                location = COALESCE($6, location),
                description = COALESCE($7, description)
            WHERE id = $8
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let report = sqlx::query_as::<_, ReportRow>(&query)
            .bind(input.incident_type.map(|t| t.as_str()))
            .bind(input.quantity_lost)
            .bind(input.estimated_value)
            .bind(incident_date)
            .bind(discovered_date)
            .bind(&input.location)
            .bind(&input.description)
            .bind(report_id)
            .fetch_one(&mut *tx)
            .await?
            .into_report()?;

        tx.commit().await?;
        Ok(report)
    }

    /// Update the investigation workflow fields. The investigation may
    /// continue after the regulatory submission, so no freeze applies.
    pub async fn update_investigation(
        &self,
        scope: TenantScope,
        report_id: Uuid,
        input: UpdateInvestigationInput,
    ) -> AppResult<LossTheftReport> {
        let mut tx = self.db.begin().await?;

        Self::lock_report(&mut tx, scope, report_id).await?;

        let query = format!(
            r#"
            UPDATE loss_theft_reports
            SET investigation_status = COALESCE($1, investigation_status),
                investigation_notes = COALESCE($2, investigation_notes),
                police_notified = COALESCE($3, police_notified),
                police_report_number = COALESCE($4, police_report_number)
            WHERE id = $5
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let report = sqlx::query_as::<_, ReportRow>(&query)
            .bind(input.investigation_status.map(|s| s.as_str()))
            .bind(&input.investigation_notes)
            .bind(input.police_notified)
            .bind(&input.police_report_number)
            .bind(report_id)
            .fetch_one(&mut *tx)
            .await?
            .into_report()?;

        tx.commit().await?;
        Ok(report)
    }

    /// Record that the incident was submitted to Health Canada. Freezes the
    /// core incident facts from then on; fails with Conflict when already
    /// submitted.
    pub async fn mark_reported_to_health_canada(
        &self,
        scope: TenantScope,
        report_id: Uuid,
        input: HcSubmissionInput,
    ) -> AppResult<LossTheftReport> {
        let mut tx = self.db.begin().await?;

        let existing = Self::lock_report(&mut tx, scope, report_id).await?;
        if existing.is_submitted() {
            return Err(AppError::Conflict {
                resource: "loss_theft_report".to_string(),
                message: "Report has already been submitted to Health Canada".to_string(),
                message_fr: "Le rapport a déjà été soumis à Santé Canada".to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE loss_theft_reports
            SET reported_to_health_canada = TRUE,
                hc_confirmation_number = $1,
                hc_submitted_at = now()
            WHERE id = $2
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let report = sqlx::query_as::<_, ReportRow>(&query)
            .bind(&input.confirmation_number)
            .bind(report_id)
            .fetch_one(&mut *tx)
            .await?
            .into_report()?;

        tx.commit().await?;

        tracing::info!(report_id = %report.id, "Incident submitted to Health Canada");
        Ok(report)
    }

    /// Whether an incident crosses the Health Canada reporting bar: theft
    /// always does, loss when the category threshold is met.
    pub async fn reportability(
        &self,
        scope: TenantScope,
        report_id: Uuid,
    ) -> AppResult<HcReportability> {
        let report = self.get_report(scope, report_id).await?;
        Ok(HcReportability {
            required: requires_health_canada_reporting(&report),
            threshold: hc_reporting_threshold(report.product_category),
        })
    }

    async fn lock_report(
        tx: &mut Transaction<'_, Postgres>,
        scope: TenantScope,
        report_id: Uuid,
    ) -> AppResult<LossTheftReport> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM loss_theft_reports WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
        );

        sqlx::query_as::<_, ReportRow>(&query)
            .bind(report_id)
            .bind(scope.tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Loss/theft report".to_string()))?
            .into_report()
    }
}
