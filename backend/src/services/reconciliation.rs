//! Physical counts and inventory reconciliation
//!
//! Counts are observations, never mutations: recording one does not touch
//! the batch. Classification compares the ledger-backed quantity with the
//! most recent count. Justifying a count is the flow that may adjust
//! inventory, because it first runs shortage analysis and an incident
//! adjusts the batch down to the observed quantity inside the same
//! transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use crate::services::batch::BatchService;
use crate::services::loss_theft::LossTheftService;
use shared::{
    classify_reconciliation, discrepancy, discrepancy_percentage, DetectionThresholds,
    LossTheftReport, PhysicalCount, ReconciliationStatus, UnitOfMeasure,
};

/// Reconciliation service; carries the detection thresholds used when a
/// justification triggers shortage analysis
#[derive(Clone)]
pub struct ReconciliationService {
    db: PgPool,
    thresholds: DetectionThresholds,
}

const COUNT_COLUMNS: &str =
    "id, tenant_id, batch_id, counted_quantity, unit, counted_by, counted_at, \
     justification_reason_id, justification_reason, justification_notes, justified_by, \
     justified_at";

/// Database row for a physical count
#[derive(Debug, sqlx::FromRow)]
struct CountRow {
    id: Uuid,
    tenant_id: Uuid,
    batch_id: Uuid,
    counted_quantity: Decimal,
    unit: String,
    counted_by: Uuid,
    counted_at: DateTime<Utc>,
    justification_reason_id: Option<Uuid>,
    justification_reason: Option<String>,
    justification_notes: Option<String>,
    justified_by: Option<Uuid>,
    justified_at: Option<DateTime<Utc>>,
}

impl CountRow {
    fn into_count(self) -> AppResult<PhysicalCount> {
        let unit = UnitOfMeasure::from_str(&self.unit)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", self.unit)))?;

        Ok(PhysicalCount {
            id: self.id,
            tenant_id: self.tenant_id,
            batch_id: self.batch_id,
            counted_quantity: self.counted_quantity,
            unit,
            counted_by: self.counted_by,
            counted_at: self.counted_at,
            justification_reason_id: self.justification_reason_id,
            justification_reason: self.justification_reason,
            justification_notes: self.justification_notes,
            justified_by: self.justified_by,
            justified_at: self.justified_at,
        })
    }
}

/// Input for recording a physical count
#[derive(Debug, Deserialize)]
pub struct RecordCountInput {
    pub counted_quantity: Decimal,
    /// When the count was taken; now when omitted
    pub counted_at: Option<DateTime<Utc>>,
}

/// Input for justifying a count's discrepancy
#[derive(Debug, Deserialize)]
pub struct JustifyCountInput {
    pub reason_id: Uuid,
    pub notes: Option<String>,
}

/// Reconciliation view for a single batch
#[derive(Debug, Serialize)]
pub struct BatchReconciliation {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub product_type: String,
    pub current_units: Decimal,
    pub unit: UnitOfMeasure,
    pub counted_quantity: Option<Decimal>,
    pub counted_at: Option<DateTime<Utc>>,
    /// Positive means a shortage
    pub discrepancy: Option<Decimal>,
    pub discrepancy_percentage: Option<Decimal>,
    pub status: ReconciliationStatus,
    pub justification_reason: Option<String>,
    pub justification_notes: Option<String>,
}

/// Result of justifying a count: the justified count plus the incident
/// report when the shortage crossed the detection thresholds
#[derive(Debug, Serialize)]
pub struct JustifyOutcome {
    pub count: PhysicalCount,
    pub incident: Option<LossTheftReport>,
}

impl ReconciliationService {
    /// Create a new ReconciliationService instance with the standing
    /// detection thresholds
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

    /// Record a physical count against a batch. Pure observation: the
    /// batch's units are untouched.
    pub async fn record_count(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: RecordCountInput,
    ) -> AppResult<PhysicalCount> {
        if input.counted_quantity < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "counted_quantity".to_string(),
                message: "Counted quantity cannot be negative".to_string(),
                message_fr: "La quantité comptée ne peut pas être négative".to_string(),
            });
        }

        let batch_unit = sqlx::query_scalar::<_, String>(
            "SELECT unit FROM batches WHERE id = $1 AND tenant_id = $2",
        )
        .bind(batch_id)
        .bind(scope.tenant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let query = format!(
            r#"
            INSERT INTO physical_counts (
                tenant_id, batch_id, counted_quantity, unit, counted_by, counted_at
            )
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, now()))
            RETURNING {COUNT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, CountRow>(&query)
            .bind(scope.tenant_id)
            .bind(batch_id)
            .bind(input.counted_quantity)
            .bind(&batch_unit)
            .bind(user_id)
            .bind(input.counted_at)
            .fetch_one(&self.db)
            .await?
            .into_count()
    }

    /// All counts for a batch, newest first
    pub async fn counts_for_batch(
        &self,
        scope: TenantScope,
        batch_id: Uuid,
    ) -> AppResult<Vec<PhysicalCount>> {
        self.ensure_batch_visible(scope, batch_id).await?;

        let query = format!(
            "SELECT {COUNT_COLUMNS} FROM physical_counts WHERE batch_id = $1 ORDER BY counted_at DESC"
        );

        let rows = sqlx::query_as::<_, CountRow>(&query)
            .bind(batch_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(CountRow::into_count).collect()
    }

    /// Reconciliation view for one batch: ledger quantity versus the most
    /// recent count, classified.
    pub async fn reconcile_batch(
        &self,
        scope: TenantScope,
        batch_id: Uuid,
    ) -> AppResult<BatchReconciliation> {
        let row = sqlx::query_as::<_, (Uuid, String, String, Decimal, String)>(
            r#"
            SELECT id, batch_code, product_type, current_units, unit
            FROM batches
            WHERE id = $1 AND (tenant_id = $2 OR $3)
            "#,
        )
        .bind(batch_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let unit = UnitOfMeasure::from_str(&row.4)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", row.4)))?;

        let latest = self.latest_count(batch_id).await?;

        Ok(Self::build_view(
            row.0, row.1, row.2, row.3, unit, latest,
        ))
    }

    /// Reconciliation views for every live batch in a facility. Feeds the
    /// facility-wide reconciliation screen.
    pub async fn reconcile_facility(
        &self,
        scope: TenantScope,
        facility_id: Uuid,
    ) -> AppResult<Vec<BatchReconciliation>> {
        let facility_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM facilities WHERE id = $1 AND (tenant_id = $2 OR $3))",
        )
        .bind(facility_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_one(&self.db)
        .await?;
        if !facility_exists {
            return Err(AppError::NotFound("Facility".to_string()));
        }

        let batches = sqlx::query_as::<_, (Uuid, String, String, Decimal, String)>(
            r#"
            SELECT id, batch_code, product_type, current_units, unit
            FROM batches
            WHERE facility_id = $1
              AND (tenant_id = $2 OR $3)
              AND status NOT IN ('destroyed', 'sold')
              AND is_archived = FALSE
            ORDER BY batch_code ASC
            "#,
        )
        .bind(facility_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_all(&self.db)
        .await?;

        let batch_ids: Vec<Uuid> = batches.iter().map(|b| b.0).collect();
        let latest_query = format!(
            r#"
            SELECT DISTINCT ON (batch_id) {COUNT_COLUMNS}
            FROM physical_counts
            WHERE batch_id = ANY($1)
            ORDER BY batch_id, counted_at DESC
            "#
        );
        let count_rows = sqlx::query_as::<_, CountRow>(&latest_query)
            .bind(&batch_ids)
            .fetch_all(&self.db)
            .await?;

        let mut latest_by_batch: HashMap<Uuid, PhysicalCount> = HashMap::new();
        for row in count_rows {
            let count = row.into_count()?;
            latest_by_batch.insert(count.batch_id, count);
        }

        let mut views = Vec::with_capacity(batches.len());
        for (id, batch_code, product_type, current_units, unit) in batches {
            let unit = UnitOfMeasure::from_str(&unit)
                .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", unit)))?;
            let latest = latest_by_batch.remove(&id);
            views.push(Self::build_view(
                id,
                batch_code,
                product_type,
                current_units,
                unit,
                latest,
            ));
        }

        Ok(views)
    }

    /// Justify a count's discrepancy. Shortage analysis runs first, inside
    /// the same transaction, so an incident it opens reflects the
    /// undisputed shortage; the justification is persisted after and is
    /// immutable once set.
    pub async fn justify_count(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        count_id: Uuid,
        input: JustifyCountInput,
    ) -> AppResult<JustifyOutcome> {
        let mut tx = self.db.begin().await?;

        let count = Self::lock_count(&mut tx, scope, count_id).await?;
        if count.is_justified() {
            return Err(AppError::Conflict {
                resource: "physical_count".to_string(),
                message: "Physical count is already justified".to_string(),
                message_fr: "Le comptage physique est déjà justifié".to_string(),
            });
        }

        let batch = BatchService::lock_batch(&mut tx, scope, count.batch_id).await?;

        let reason_name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM discrepancy_reasons WHERE id = $1 AND tenant_id = $2",
        )
        .bind(input.reason_id)
        .bind(scope.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Discrepancy reason".to_string()))?;

        let incident = LossTheftService::analyze_shortage(
            &mut tx,
            &self.thresholds,
            &batch,
            batch.current_units,
            count.counted_quantity,
            &reason_name,
            user_id,
        )
        .await?;

        let update_query = format!(
            r#"
            UPDATE physical_counts
            SET justification_reason_id = $1, justification_reason = $2,
                justification_notes = $3, justified_by = $4, justified_at = now()
            WHERE id = $5
            RETURNING {COUNT_COLUMNS}
            "#
        );
        let justified = sqlx::query_as::<_, CountRow>(&update_query)
            .bind(input.reason_id)
            .bind(&reason_name)
            .bind(&input.notes)
            .bind(user_id)
            .bind(count.id)
            .fetch_one(&mut *tx)
            .await?
            .into_count()?;

        tx.commit().await?;

        Ok(JustifyOutcome {
            count: justified,
            incident,
        })
    }

    fn build_view(
        batch_id: Uuid,
        batch_code: String,
        product_type: String,
        current_units: Decimal,
        unit: UnitOfMeasure,
        latest: Option<PhysicalCount>,
    ) -> BatchReconciliation {
        let status = classify_reconciliation(latest.as_ref());
        let (counted_quantity, counted_at, diff, pct, reason, notes) = match &latest {
            Some(count) => (
                Some(count.counted_quantity),
                Some(count.counted_at),
                Some(discrepancy(current_units, count.counted_quantity)),
                Some(discrepancy_percentage(current_units, count.counted_quantity)),
                count.justification_reason.clone(),
                count.justification_notes.clone(),
            ),
            None => (None, None, None, None, None, None),
        };

        BatchReconciliation {
            batch_id,
            batch_code,
            product_type,
            current_units,
            unit,
            counted_quantity,
            counted_at,
            discrepancy: diff,
            discrepancy_percentage: pct,
            status,
            justification_reason: reason,
            justification_notes: notes,
        }
    }

    async fn latest_count(&self, batch_id: Uuid) -> AppResult<Option<PhysicalCount>> {
        let query = format!(
            r#"
            SELECT {COUNT_COLUMNS}
            FROM physical_counts
            WHERE batch_id = $1
            ORDER BY counted_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, CountRow>(&query)
            .bind(batch_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(CountRow::into_count).transpose()
    }

    async fn lock_count(
        tx: &mut Transaction<'_, Postgres>,
        scope: TenantScope,
        count_id: Uuid,
    ) -> AppResult<PhysicalCount> {
        let query = format!(
            "SELECT {COUNT_COLUMNS} FROM physical_counts WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
        );

        sqlx::query_as::<_, CountRow>(&query)
            .bind(count_id)
            .bind(scope.tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Physical count".to_string()))?
            .into_count()
    }

    async fn ensure_batch_visible(&self, scope: TenantScope, batch_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM batches WHERE id = $1 AND (tenant_id = $2 OR $3))",
        )
        .bind(batch_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Batch".to_string()));
        }
        Ok(())
    }
}
