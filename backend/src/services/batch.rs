//! Batch lifecycle state machine
//!
//! Every operation that changes a batch's quantity or lifecycle state runs
//! here. Each multi-step mutation locks the batch row (`SELECT ... FOR
//! UPDATE`), applies the change, and appends the traceability event inside
//! one transaction, so the cached `current_units` projection and the ledger
//! can never diverge and the `current_units >= 0` invariant holds under
//! concurrent callers.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use crate::services::traceability::{NewEvent, TraceabilityService};
use shared::{
    derive_flags, generate_batch_code, validate_split_quantity, validate_unit_for_category, Batch,
    BatchStatus, EventType, ProductCategory, UnitOfMeasure,
};

/// State machine service for batch lifecycle operations
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

pub(crate) const BATCH_COLUMNS: &str =
    "id, tenant_id, facility_id, cultivation_area_id, parent_batch_id, batch_code, name, \
     product_type, product_category, variety, end_type, initial_units, current_units, unit, \
     is_packaged, sub_location, status, is_archived, archived_at, archive_reason, is_recalled, \
     recalled_at, recalled_by, recall_reason, created_by, created_at, updated_at";

/// Database row for a batch
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BatchRow {
    id: Uuid,
    tenant_id: Uuid,
    facility_id: Uuid,
    cultivation_area_id: Option<Uuid>,
    parent_batch_id: Option<Uuid>,
    batch_code: String,
    name: String,
    product_type: String,
    product_category: String,
    variety: Option<String>,
    end_type: Option<String>,
    initial_units: Decimal,
    current_units: Decimal,
    unit: String,
    is_packaged: bool,
    sub_location: Option<String>,
    status: String,
    is_archived: bool,
    archived_at: Option<chrono::DateTime<Utc>>,
    archive_reason: Option<String>,
    is_recalled: bool,
    recalled_at: Option<chrono::DateTime<Utc>>,
    recalled_by: Option<Uuid>,
    recall_reason: Option<String>,
    created_by: Uuid,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl BatchRow {
    pub(crate) fn into_batch(self) -> AppResult<Batch> {
        let status = BatchStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown batch status: {}", self.status)))?;
        let product_category = ProductCategory::from_str(&self.product_category).ok_or_else(|| {
            AppError::Internal(format!("Unknown product category: {}", self.product_category))
        })?;
        let unit = UnitOfMeasure::from_str(&self.unit)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", self.unit)))?;

        Ok(Batch {
            id: self.id,
            tenant_id: self.tenant_id,
            facility_id: self.facility_id,
            cultivation_area_id: self.cultivation_area_id,
            parent_batch_id: self.parent_batch_id,
            batch_code: self.batch_code,
            name: self.name,
            product_type: self.product_type,
            product_category,
            variety: self.variety,
            end_type: self.end_type,
            initial_units: self.initial_units,
            current_units: self.current_units,
            unit,
            is_packaged: self.is_packaged,
            sub_location: self.sub_location,
            status,
            is_archived: self.is_archived,
            archived_at: self.archived_at,
            archive_reason: self.archive_reason,
            is_recalled: self.is_recalled,
            recalled_at: self.recalled_at,
            recalled_by: self.recalled_by,
            recall_reason: self.recall_reason,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for creating a batch from cultivation intake
#[derive(Debug, Deserialize)]
pub struct CreateBatchInput {
    pub facility_id: Uuid,
    pub cultivation_area_id: Uuid,
    pub name: String,
    pub product_type: String,
    pub product_category: ProductCategory,
    pub variety: Option<String>,
    pub end_type: Option<String>,
    pub quantity: Decimal,
    pub unit: UnitOfMeasure,
    pub is_packaged: Option<bool>,
    pub sub_location: Option<String>,
}

/// Input for splitting a batch
#[derive(Debug, Deserialize)]
pub struct SplitBatchInput {
    pub quantity: Decimal,
    /// Target area for the new batch; the source area when omitted
    pub new_cultivation_area_id: Option<Uuid>,
    pub new_product_type: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Result of a split: the reduced source and the new child batch
#[derive(Debug, Serialize)]
pub struct BatchSplit {
    pub source: Batch,
    pub new_batch: Batch,
}

/// Input for processing a batch
#[derive(Debug, Deserialize)]
pub struct ProcessBatchInput {
    pub processed_quantity: Decimal,
    pub method: String,
    pub new_product_type: Option<String>,
    pub new_product_category: Option<ProductCategory>,
    pub sub_location: Option<String>,
}

/// Input for a guarded status change
#[derive(Debug, Deserialize)]
pub struct ChangeStatusInput {
    pub status: BatchStatus,
    pub reason: Option<String>,
}

/// Input for archiving a batch
#[derive(Debug, Deserialize)]
pub struct ArchiveBatchInput {
    pub reason: Option<String>,
}

/// Input for recalling a batch
#[derive(Debug, Deserialize)]
pub struct RecallBatchInput {
    pub reason: String,
}

/// Input for the order-fulfillment deduction path
#[derive(Debug, Deserialize)]
pub struct FulfillOrderInput {
    pub quantity: Decimal,
    pub order_id: Uuid,
    pub destination: Option<String>,
}

/// Input for shipping against a manifest
#[derive(Debug, Deserialize)]
pub struct ShipBatchInput {
    pub quantity: Decimal,
    pub manifest_number: String,
    pub destination: String,
}

/// Input for destroying a quantity of material
#[derive(Debug, Deserialize)]
pub struct DestroyQuantityInput {
    pub quantity: Decimal,
    pub method: String,
    pub reason: String,
}

/// Input for moving a batch within a facility
#[derive(Debug, Deserialize)]
pub struct MoveBatchInput {
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub to_sub_location: Option<String>,
    pub description: Option<String>,
}

/// Input for recording a harvest yield into a batch
#[derive(Debug, Deserialize)]
pub struct RecordHarvestInput {
    pub quantity: Decimal,
    pub description: Option<String>,
}

/// Input for receiving an inbound delivery into a batch
#[derive(Debug, Deserialize)]
pub struct ReceiveDeliveryInput {
    pub quantity: Decimal,
    pub from_location: Option<String>,
    pub reference_id: Option<String>,
}

/// List filter for batch queries
#[derive(Debug, Default)]
pub struct BatchFilter {
    pub facility_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
    pub include_archived: bool,
    /// Cross-tenant listing; honored only for privileged scopes
    pub all_tenants: bool,
}

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Lock a batch row for the duration of the caller's transaction.
    /// Mutations always bind the scope's tenant id; privilege never widens
    /// a write.
    pub(crate) async fn lock_batch(
        tx: &mut Transaction<'_, Postgres>,
        scope: TenantScope,
        batch_id: Uuid,
    ) -> AppResult<Batch> {
        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
        );

        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id)
            .bind(scope.tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?
            .into_batch()
    }

    /// Create a batch from cultivation intake. The cultivation area row is
    /// locked so concurrent creates cannot jointly exceed its capacity; the
    /// ledger starts empty (the stored initial_units is the replay base).
    pub async fn create_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        input: CreateBatchInput,
    ) -> AppResult<Batch> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Batch name cannot be empty".to_string(),
                message_fr: "Le nom du lot ne peut pas être vide".to_string(),
            });
        }
        if input.quantity <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be greater than zero".to_string(),
                message_fr: "La quantité doit être supérieure à zéro".to_string(),
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

        let site_code = sqlx::query_scalar::<_, String>(
            "SELECT site_code FROM facilities WHERE id = $1 AND tenant_id = $2",
        )
        .bind(input.facility_id)
        .bind(scope.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Facility".to_string()))?;

        let area = sqlx::query_as::<_, (Uuid, Decimal)>(
            r#"
            SELECT facility_id, capacity_units
            FROM cultivation_areas
            WHERE id = $1 AND tenant_id = $2
            FOR UPDATE
            "#,
        )
        .bind(input.cultivation_area_id)
        .bind(scope.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Cultivation area".to_string()))?;

        if area.0 != input.facility_id {
            return Err(AppError::Validation {
                field: "cultivation_area_id".to_string(),
                message: "Cultivation area does not belong to the given facility".to_string(),
                message_fr: "La zone de culture n'appartient pas à l'installation indiquée"
                    .to_string(),
            });
        }

        let in_use = Self::area_in_use(&mut tx, input.cultivation_area_id).await?;
        if in_use + input.quantity > area.1 {
            return Err(AppError::CapacityExceeded {
                capacity_units: area.1,
                in_use_units: in_use,
                requested_units: input.quantity,
            });
        }

        let batch_code =
            Self::next_batch_code(&mut tx, input.facility_id, &site_code).await?;

        let query = format!(
            r#"
            INSERT INTO batches (
                tenant_id, facility_id, cultivation_area_id, batch_code, name, product_type,
                product_category, variety, end_type, initial_units, current_units, unit,
                is_packaged, sub_location, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11, $12, $13, $14)
            RETURNING {BATCH_COLUMNS}
            "#
        );

        let batch = sqlx::query_as::<_, BatchRow>(&query)
            .bind(scope.tenant_id)
            .bind(input.facility_id)
            .bind(input.cultivation_area_id)
            .bind(&batch_code)
            .bind(input.name.trim())
            .bind(&input.product_type)
            .bind(input.product_category.as_str())
            .bind(&input.variety)
            .bind(&input.end_type)
            .bind(input.quantity)
            .bind(input.unit.as_str())
            .bind(input.is_packaged.unwrap_or(false))
            .bind(&input.sub_location)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        tx.commit().await?;

        tracing::info!(batch_id = %batch.id, batch_code = %batch.batch_code, "Batch created");
        Ok(batch)
    }

    /// Split a quantity out of a batch into a new child batch. The source
    /// decrement, the child insert, and the single `split` ledger event
    /// commit together; partial application is never observable.
    pub async fn split_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: SplitBatchInput,
    ) -> AppResult<BatchSplit> {
        let mut tx = self.db.begin().await?;

        let source = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&source)?;

        if let Err(msg) = validate_split_quantity(input.quantity, source.current_units) {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
                message_fr: "La quantité à séparer doit être positive et inférieure à la quantité du lot source".to_string(),
            });
        }

        // Capacity only changes when the child lands in a different area.
        let target_area = input.new_cultivation_area_id.or(source.cultivation_area_id);
        if let Some(area_id) = target_area {
            if Some(area_id) != source.cultivation_area_id {
                let capacity = sqlx::query_scalar::<_, Decimal>(
                    "SELECT capacity_units FROM cultivation_areas WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
                )
                .bind(area_id)
                .bind(scope.tenant_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Cultivation area".to_string()))?;

                let in_use = Self::area_in_use(&mut tx, area_id).await?;
                if in_use + input.quantity > capacity {
                    return Err(AppError::CapacityExceeded {
                        capacity_units: capacity,
                        in_use_units: in_use,
                        requested_units: input.quantity,
                    });
                }
            }
        }

        let site_code = sqlx::query_scalar::<_, String>(
            "SELECT site_code FROM facilities WHERE id = $1 AND tenant_id = $2",
        )
        .bind(source.facility_id)
        .bind(scope.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Facility".to_string()))?;

        let update_query = format!(
            "UPDATE batches SET current_units = current_units - $1 WHERE id = $2 RETURNING {BATCH_COLUMNS}"
        );
        let updated_source = sqlx::query_as::<_, BatchRow>(&update_query)
            .bind(input.quantity)
            .bind(source.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let batch_code = Self::next_batch_code(&mut tx, source.facility_id, &site_code).await?;
        let child_name = input
            .name
            .unwrap_or_else(|| format!("{} (split)", source.name));

        let insert_query = format!(
            r#"
            INSERT INTO batches (
                tenant_id, facility_id, cultivation_area_id, parent_batch_id, batch_code, name,
                product_type, product_category, variety, end_type, initial_units, current_units,
                unit, is_packaged, sub_location, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $12, $13, $14, $15)
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let new_batch = sqlx::query_as::<_, BatchRow>(&insert_query)
            .bind(scope.tenant_id)
            .bind(source.facility_id)
            .bind(target_area)
            .bind(source.id)
            .bind(&batch_code)
            .bind(&child_name)
            .bind(input.new_product_type.as_deref().unwrap_or(&source.product_type))
            .bind(source.product_category.as_str())
            .bind(&source.variety)
            .bind(&source.end_type)
            .bind(input.quantity)
            .bind(source.unit.as_str())
            .bind(source.is_packaged)
            .bind(&source.sub_location)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let event = NewEvent {
            new_batch_id: Some(new_batch.id),
            quantity: Some(input.quantity),
            unit: Some(source.unit),
            description: input.description,
            ..NewEvent::for_batch(&source, EventType::Split, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;

        tracing::info!(
            source_id = %updated_source.id,
            new_batch_id = %new_batch.id,
            quantity = %input.quantity,
            "Batch split"
        );
        Ok(BatchSplit {
            source: updated_source,
            new_batch,
        })
    }

    /// Process a batch: set its units to the processed yield and record the
    /// transformation. The `processing` event carries the pre-process
    /// quantity; yield loss is appended separately as `adjustment_loss` so
    /// regulators can audit loss apart from intentional transformation.
    pub async fn process_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: ProcessBatchInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;

        if input.processed_quantity < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "processed_quantity".to_string(),
                message: "Processed quantity cannot be negative".to_string(),
                message_fr: "La quantité transformée ne peut pas être négative".to_string(),
            });
        }
        if input.processed_quantity > batch.current_units {
            return Err(AppError::InsufficientQuantity {
                available: batch.current_units,
                requested: input.processed_quantity,
            });
        }

        let category = input.new_product_category.unwrap_or(batch.product_category);
        if let Err(msg) = validate_unit_for_category(category, batch.unit) {
            return Err(AppError::Validation {
                field: "new_product_category".to_string(),
                message: msg.to_string(),
                message_fr: "L'unité de mesure ne correspond pas à la catégorie de produit"
                    .to_string(),
            });
        }

        let pre_process_units = batch.current_units;
        let loss = pre_process_units - input.processed_quantity;

        let query = format!(
            r#"
            UPDATE batches
            SET current_units = $1, product_type = $2, product_category = $3,
                sub_location = COALESCE($4, sub_location)
            WHERE id = $5
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, BatchRow>(&query)
            .bind(input.processed_quantity)
            .bind(input.new_product_type.as_deref().unwrap_or(&batch.product_type))
            .bind(category.as_str())
            .bind(&input.sub_location)
            .bind(batch.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let processing_event = NewEvent {
            quantity: Some(pre_process_units),
            unit: Some(batch.unit),
            description: Some(format!("Processed using {}", input.method)),
            ..NewEvent::for_batch(&batch, EventType::Processing, user_id)
        };
        TraceabilityService::append(&mut tx, processing_event).await?;

        if loss > Decimal::ZERO {
            let loss_event = NewEvent {
                quantity: Some(loss),
                unit: Some(batch.unit),
                description: Some(format!("Processing yield loss ({})", input.method)),
                ..NewEvent::for_batch(&batch, EventType::AdjustmentLoss, user_id)
            };
            TraceabilityService::append(&mut tx, loss_event).await?;
        }

        tx.commit().await?;

        tracing::info!(
            batch_id = %updated.id,
            processed = %input.processed_quantity,
            loss = %loss,
            "Batch processed"
        );
        Ok(updated)
    }

    /// Guarded status transition. The transition table rejects exits from
    /// the terminal pair; archived/recalled flags follow from
    /// `derive_flags` so the status table stays the single source of truth.
    pub async fn change_status(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: ChangeStatusInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;

        if batch.status == input.status {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: format!("Batch already has status {}", batch.status.as_str()),
                message_fr: format!("Le lot a déjà le statut {}", batch.status.as_str()),
            });
        }
        if !batch.status.can_transition_to(input.status) {
            return Err(AppError::InvalidTransition(format!(
                "Batch {} cannot move from {} to {}: {} is a terminal status",
                batch.batch_code,
                batch.status.as_str(),
                input.status.as_str(),
                batch.status.as_str(),
            )));
        }

        let flags = derive_flags(batch.status, input.status);
        let updated = Self::apply_status(
            &mut tx,
            batch.id,
            input.status,
            flags.set_archived,
            flags.set_recalled,
            input.reason.as_deref(),
            user_id,
        )
        .await?;

        let description = match &input.reason {
            Some(reason) => format!(
                "{} -> {}: {}",
                batch.status.as_str(),
                input.status.as_str(),
                reason
            ),
            None => format!("{} -> {}", batch.status.as_str(), input.status.as_str()),
        };
        let event = NewEvent {
            description: Some(description),
            ..NewEvent::for_batch(&batch, EventType::StatusChange, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Archive a batch. Fails with Conflict when already archived; the
    /// guard makes the operation idempotency-safe rather than idempotent.
    pub async fn archive_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: ArchiveBatchInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        if batch.is_archived {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: "Batch is already archived".to_string(),
                message_fr: "Le lot est déjà archivé".to_string(),
            });
        }
        if batch.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Batch {} is {} and cannot be archived",
                batch.batch_code,
                batch.status.as_str()
            )));
        }

        let updated = Self::apply_status(
            &mut tx,
            batch.id,
            BatchStatus::Archived,
            Some(true),
            None,
            input.reason.as_deref(),
            user_id,
        )
        .await?;

        let event = NewEvent {
            description: input.reason,
            ..NewEvent::for_batch(&batch, EventType::Archive, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Restore an archived batch back to active. Fails with Conflict when
    /// the batch is not archived.
    pub async fn restore_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        if !batch.is_archived {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: "Batch is not archived".to_string(),
                message_fr: "Le lot n'est pas archivé".to_string(),
            });
        }

        let updated = Self::apply_status(
            &mut tx,
            batch.id,
            BatchStatus::Active,
            Some(false),
            None,
            None,
            user_id,
        )
        .await?;

        let event = NewEvent::for_batch(&batch, EventType::Restore, user_id);
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Recall a batch. A recalled batch keeps its operational status but is
    /// excluded from order fulfillment and available-batch listings.
    pub async fn recall_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: RecallBatchInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        if batch.is_recalled {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: "Batch is already recalled".to_string(),
                message_fr: "Le lot fait déjà l'objet d'un rappel".to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE batches
            SET is_recalled = TRUE, recalled_at = now(), recalled_by = $1, recall_reason = $2
            WHERE id = $3
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, BatchRow>(&query)
            .bind(user_id)
            .bind(&input.reason)
            .bind(batch.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let event = NewEvent {
            description: Some(input.reason),
            ..NewEvent::for_batch(&batch, EventType::Recall, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;

        tracing::warn!(batch_id = %updated.id, batch_code = %updated.batch_code, "Batch recalled");
        Ok(updated)
    }

    /// Clear a recall. Fails with Conflict when the batch is not recalled.
    pub async fn remove_recall(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        if !batch.is_recalled {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: "Batch is not recalled".to_string(),
                message_fr: "Le lot ne fait pas l'objet d'un rappel".to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE batches
            SET is_recalled = FALSE, recalled_at = NULL, recalled_by = NULL, recall_reason = NULL
            WHERE id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let event = NewEvent::for_batch(&batch, EventType::RecallRemoved, user_id);
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete a batch record. Permitted only for untouched batches: zero
    /// ledger events (owned or referencing), zero child batches, zero
    /// loss/theft reports. The Conflict names the blocking counts.
    pub async fn delete_batch(&self, scope: TenantScope, batch_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;

        let events = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM traceability_events WHERE batch_id = $1 OR new_batch_id = $1",
        )
        .bind(batch.id)
        .fetch_one(&mut *tx)
        .await?;
        let children =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM batches WHERE parent_batch_id = $1")
                .bind(batch.id)
                .fetch_one(&mut *tx)
                .await?;
        let reports = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM loss_theft_reports WHERE batch_id = $1",
        )
        .bind(batch.id)
        .fetch_one(&mut *tx)
        .await?;

        if events > 0 || children > 0 || reports > 0 {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: format!(
                    "Batch has {} ledger events, {} child batches, and {} loss/theft reports and cannot be deleted",
                    events, children, reports
                ),
                message_fr: format!(
                    "Le lot compte {} événements de traçabilité, {} lots enfants et {} rapports de perte ou de vol et ne peut pas être supprimé",
                    events, children, reports
                ),
            });
        }

        sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(batch.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deduct units for an order. Recalled and terminal batches are
    /// rejected before any mutation.
    pub async fn fulfill_order(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: FulfillOrderInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;
        if batch.is_recalled {
            return Err(AppError::InvalidTransition(format!(
                "Batch {} is recalled and excluded from order fulfillment",
                batch.batch_code
            )));
        }
        Self::validate_deduction(&batch, input.quantity)?;

        let updated = Self::deduct_units(&mut tx, batch.id, input.quantity).await?;

        let event = NewEvent {
            quantity: Some(input.quantity),
            unit: Some(batch.unit),
            to_location: input.destination,
            reference_type: Some("order".to_string()),
            reference_id: Some(input.order_id.to_string()),
            ..NewEvent::for_batch(&batch, EventType::OrderFulfillment, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Ship units against a manifest. When the batch ships out completely
    /// its status moves to in_transit.
    pub async fn ship_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: ShipBatchInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;
        if batch.is_recalled {
            return Err(AppError::InvalidTransition(format!(
                "Batch {} is recalled and cannot be shipped",
                batch.batch_code
            )));
        }
        Self::validate_deduction(&batch, input.quantity)?;

        let mut updated = Self::deduct_units(&mut tx, batch.id, input.quantity).await?;

        if updated.current_units.is_zero() && batch.status != BatchStatus::InTransit {
            updated = Self::apply_status(
                &mut tx,
                batch.id,
                BatchStatus::InTransit,
                None,
                None,
                None,
                user_id,
            )
            .await?;
        }

        let event = NewEvent {
            quantity: Some(input.quantity),
            unit: Some(batch.unit),
            to_location: Some(input.destination),
            reference_type: Some("manifest".to_string()),
            reference_id: Some(input.manifest_number),
            ..NewEvent::for_batch(&batch, EventType::Shipment, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Destroy a quantity of material. Destroying the full remaining
    /// quantity moves the batch into the terminal destroyed status.
    pub async fn destroy_quantity(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: DestroyQuantityInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;
        Self::validate_deduction(&batch, input.quantity)?;

        let mut updated = Self::deduct_units(&mut tx, batch.id, input.quantity).await?;

        if updated.current_units.is_zero() {
            updated = Self::apply_status(
                &mut tx,
                batch.id,
                BatchStatus::Destroyed,
                None,
                None,
                None,
                user_id,
            )
            .await?;
        }

        let event = NewEvent {
            quantity: Some(input.quantity),
            unit: Some(batch.unit),
            description: Some(format!("{}: {}", input.method, input.reason)),
            ..NewEvent::for_batch(&batch, EventType::Destruction, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;

        tracing::info!(
            batch_id = %updated.id,
            quantity = %input.quantity,
            method = %input.method,
            "Material destroyed"
        );
        Ok(updated)
    }

    /// Record a movement. Quantity is not affected; the event captures the
    /// on-hand amount at the time of the move for disposition reporting.
    pub async fn move_batch(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: MoveBatchInput,
    ) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;

        let query = format!(
            "UPDATE batches SET sub_location = $1 WHERE id = $2 RETURNING {BATCH_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BatchRow>(&query)
            .bind(&input.to_sub_location)
            .bind(batch.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let event = NewEvent {
            quantity: Some(batch.current_units),
            unit: Some(batch.unit),
            from_location: input.from_location,
            to_location: input.to_location,
            from_sub_location: batch.sub_location.clone(),
            to_sub_location: input.to_sub_location,
            description: input.description,
            ..NewEvent::for_batch(&batch, EventType::Movement, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Record harvested yield into a batch (feeds the Produced column of
    /// the monthly inventory report).
    pub async fn record_harvest(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: RecordHarvestInput,
    ) -> AppResult<Batch> {
        self.add_units(
            scope,
            user_id,
            batch_id,
            input.quantity,
            EventType::Harvest,
            input.description,
            None,
            None,
        )
        .await
    }

    /// Receive an inbound delivery into a batch (feeds the Received column
    /// of the monthly inventory report).
    pub async fn receive_delivery(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        input: ReceiveDeliveryInput,
    ) -> AppResult<Batch> {
        self.add_units(
            scope,
            user_id,
            batch_id,
            input.quantity,
            EventType::Delivery,
            None,
            input.from_location,
            input.reference_id,
        )
        .await
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, scope: TenantScope, batch_id: Uuid) -> AppResult<Batch> {
        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND (tenant_id = $2 OR $3)"
        );

        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id)
            .bind(scope.tenant_id)
            .bind(scope.privileged)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?
            .into_batch()
    }

    /// List batches for the tenant. A privileged scope may opt into a
    /// cross-tenant listing through the filter.
    pub async fn list_batches(
        &self,
        scope: TenantScope,
        filter: BatchFilter,
    ) -> AppResult<Vec<Batch>> {
        let cross_tenant = filter.all_tenants && scope.privileged;
        let query = format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE (tenant_id = $1 OR $2)
              AND ($3::uuid IS NULL OR facility_id = $3)
              AND ($4::varchar IS NULL OR status = $4)
              AND ($5 OR is_archived = FALSE)
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, BatchRow>(&query)
            .bind(scope.tenant_id)
            .bind(cross_tenant)
            .bind(filter.facility_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.include_archived)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    /// Batches available for order fulfillment: not recalled, not archived,
    /// not terminal, with units on hand.
    pub async fn list_available_batches(
        &self,
        scope: TenantScope,
        facility_id: Option<Uuid>,
    ) -> AppResult<Vec<Batch>> {
        let query = format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR facility_id = $2)
              AND status NOT IN ('destroyed', 'sold', 'archived')
              AND is_archived = FALSE
              AND is_recalled = FALSE
              AND current_units > 0
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, BatchRow>(&query)
            .bind(scope.tenant_id)
            .bind(facility_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    // ------------------------------------------------------------------
    // Shared guards and transaction helpers
    // ------------------------------------------------------------------

    /// Terminal batches accept no further quantity or lifecycle changes.
    pub(crate) fn ensure_mutable(batch: &Batch) -> AppResult<()> {
        if batch.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Batch {} is {} and accepts no further changes",
                batch.batch_code,
                batch.status.as_str()
            )));
        }
        Ok(())
    }

    /// Deduction guard shared by fulfillment, shipment, and destruction.
    fn validate_deduction(batch: &Batch, quantity: Decimal) -> AppResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be greater than zero".to_string(),
                message_fr: "La quantité doit être supérieure à zéro".to_string(),
            });
        }
        if quantity > batch.current_units {
            return Err(AppError::InsufficientQuantity {
                available: batch.current_units,
                requested: quantity,
            });
        }
        Ok(())
    }

    async fn deduct_units(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
        quantity: Decimal,
    ) -> AppResult<Batch> {
        let query = format!(
            "UPDATE batches SET current_units = current_units - $1 WHERE id = $2 RETURNING {BATCH_COLUMNS}"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(quantity)
            .bind(batch_id)
            .fetch_one(&mut **tx)
            .await?
            .into_batch()
    }

    /// Apply a status plus its derived flag changes in one UPDATE. `None`
    /// flag values leave the corresponding fields untouched.
    async fn apply_status(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
        status: BatchStatus,
        set_archived: Option<bool>,
        set_recalled: Option<bool>,
        reason: Option<&str>,
        user_id: Uuid,
    ) -> AppResult<Batch> {
        let query = format!(
            r#"
            UPDATE batches
            SET status = $1,
                is_archived = COALESCE($2, is_archived),
                archived_at = CASE WHEN $2 IS NULL THEN archived_at
                                   WHEN $2 THEN now() ELSE NULL END,
                archive_reason = CASE WHEN $2 IS NULL THEN archive_reason
                                      WHEN $2 THEN $3 ELSE NULL END,
                is_recalled = COALESCE($4, is_recalled),
                recalled_at = CASE WHEN $4 IS NULL THEN recalled_at
                                   WHEN $4 THEN now() ELSE NULL END,
                recalled_by = CASE WHEN $4 IS NULL THEN recalled_by
                                   WHEN $4 THEN $5 ELSE NULL END,
                recall_reason = CASE WHEN $4 IS NULL THEN recall_reason
                                     WHEN $4 THEN $3 ELSE NULL END
            WHERE id = $6
            RETURNING {BATCH_COLUMNS}
            "#
        );

        sqlx::query_as::<_, BatchRow>(&query)
            .bind(status.as_str())
            .bind(set_archived)
            .bind(reason)
            .bind(set_recalled)
            .bind(user_id)
            .bind(batch_id)
            .fetch_one(&mut **tx)
            .await?
            .into_batch()
    }

    /// Sum of units held by live batches in a cultivation area, read inside
    /// the caller's transaction so capacity checks see a stable total.
    async fn area_in_use(
        tx: &mut Transaction<'_, Postgres>,
        area_id: Uuid,
    ) -> AppResult<Decimal> {
        let in_use = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(current_units), 0)
            FROM batches
            WHERE cultivation_area_id = $1
              AND status NOT IN ('destroyed', 'sold')
              AND is_archived = FALSE
            "#,
        )
        .bind(area_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(in_use)
    }

    /// Next batch code for a facility: CCP-YYYY-SITE-NNNN with a
    /// per-facility, per-year sequence.
    async fn next_batch_code(
        tx: &mut Transaction<'_, Postgres>,
        facility_id: Uuid,
        site_code: &str,
    ) -> AppResult<String> {
        let year = Utc::now().year();
        let sequence: i32 = sqlx::query_scalar("SELECT get_next_batch_sequence($1, $2)")
            .bind(facility_id)
            .bind(year)
            .fetch_one(&mut **tx)
            .await?;

        Ok(generate_batch_code(site_code, year, sequence))
    }

    /// Inbound addition shared by harvest and delivery recording.
    #[allow(clippy::too_many_arguments)]
    async fn add_units(
        &self,
        scope: TenantScope,
        user_id: Uuid,
        batch_id: Uuid,
        quantity: Decimal,
        event_type: EventType,
        description: Option<String>,
        from_location: Option<String>,
        reference_id: Option<String>,
    ) -> AppResult<Batch> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be greater than zero".to_string(),
                message_fr: "La quantité doit être supérieure à zéro".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let batch = Self::lock_batch(&mut tx, scope, batch_id).await?;
        Self::ensure_mutable(&batch)?;

        let query = format!(
            "UPDATE batches SET current_units = current_units + $1 WHERE id = $2 RETURNING {BATCH_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BatchRow>(&query)
            .bind(quantity)
            .bind(batch.id)
            .fetch_one(&mut *tx)
            .await?
            .into_batch()?;

        let reference_type = reference_id.as_ref().map(|_| "manifest".to_string());
        let event = NewEvent {
            quantity: Some(quantity),
            unit: Some(batch.unit),
            description,
            from_location,
            reference_type,
            reference_id,
            ..NewEvent::for_batch(&batch, event_type, user_id)
        };
        TraceabilityService::append(&mut tx, event).await?;

        tx.commit().await?;
        Ok(updated)
    }
}
