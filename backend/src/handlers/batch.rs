//! HTTP handlers for batch lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::batch::{
    ArchiveBatchInput, BatchFilter, BatchService, BatchSplit, ChangeStatusInput, CreateBatchInput,
    DestroyQuantityInput, FulfillOrderInput, MoveBatchInput, ProcessBatchInput, RecallBatchInput,
    ReceiveDeliveryInput, RecordHarvestInput, ShipBatchInput, SplitBatchInput,
};
use crate::AppState;
use shared::{Batch, BatchStatus};

#[derive(Debug, Deserialize)]
pub struct ListBatchesQuery {
    pub facility_id: Option<Uuid>,
    pub status: Option<String>,
    pub include_archived: Option<bool>,
    pub all_tenants: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableBatchesQuery {
    pub facility_id: Option<Uuid>,
}

/// Create a batch from cultivation intake
pub async fn create_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateBatchInput>,
) -> AppResult<(StatusCode, Json<Batch>)> {
    let service = BatchService::new(state.db);
    let batch = service
        .create_batch(current_user.0.scope(), current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// List batches for the tenant
pub async fn list_batches(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListBatchesQuery>,
) -> AppResult<Json<Vec<Batch>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(BatchStatus::from_str(raw).ok_or_else(|| AppError::Validation {
            field: "status".to_string(),
            message: format!("Unknown batch status: {}", raw),
            message_fr: format!("Statut de lot inconnu : {}", raw),
        })?),
        None => None,
    };

    let filter = BatchFilter {
        facility_id: query.facility_id,
        status,
        include_archived: query.include_archived.unwrap_or(false),
        all_tenants: query.all_tenants.unwrap_or(false),
    };

    let service = BatchService::new(state.db);
    let batches = service.list_batches(current_user.0.scope(), filter).await?;
    Ok(Json(batches))
}

/// List batches available for order fulfillment
pub async fn list_available_batches(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<AvailableBatchesQuery>,
) -> AppResult<Json<Vec<Batch>>> {
    let service = BatchService::new(state.db);
    let batches = service
        .list_available_batches(current_user.0.scope(), query.facility_id)
        .await?;
    Ok(Json(batches))
}

/// Get a batch by ID
pub async fn get_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service.get_batch(current_user.0.scope(), batch_id).await?;
    Ok(Json(batch))
}

/// Delete an untouched batch record
pub async fn delete_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = BatchService::new(state.db);
    service.delete_batch(current_user.0.scope(), batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Split a quantity into a new child batch
pub async fn split_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<SplitBatchInput>,
) -> AppResult<(StatusCode, Json<BatchSplit>)> {
    let service = BatchService::new(state.db);
    let split = service
        .split_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(split)))
}

/// Process a batch into a new product form
pub async fn process_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ProcessBatchInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .process_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Change a batch's lifecycle status
pub async fn change_batch_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ChangeStatusInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .change_status(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Archive a batch
pub async fn archive_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ArchiveBatchInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .archive_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Restore an archived batch
pub async fn restore_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .restore_batch(current_user.0.scope(), current_user.0.user_id, batch_id)
        .await?;
    Ok(Json(batch))
}

/// Recall a batch
pub async fn recall_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<RecallBatchInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .recall_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Clear a batch's recall
pub async fn remove_batch_recall(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .remove_recall(current_user.0.scope(), current_user.0.user_id, batch_id)
        .await?;
    Ok(Json(batch))
}

/// Deduct units for an order
pub async fn fulfill_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<FulfillOrderInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .fulfill_order(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Ship units against a manifest
pub async fn ship_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ShipBatchInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .ship_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Destroy a quantity of material
pub async fn destroy_batch_quantity(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<DestroyQuantityInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .destroy_quantity(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Record a movement within or between locations
pub async fn move_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<MoveBatchInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .move_batch(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Record harvested yield into a batch
pub async fn record_batch_harvest(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<RecordHarvestInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .record_harvest(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}

/// Receive an inbound delivery into a batch
pub async fn receive_batch_delivery(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<ReceiveDeliveryInput>,
) -> AppResult<Json<Batch>> {
    let service = BatchService::new(state.db);
    let batch = service
        .receive_delivery(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(batch))
}
