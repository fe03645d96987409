//! HTTP handlers for physical counts and reconciliation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reconciliation::{
    BatchReconciliation, JustifyCountInput, JustifyOutcome, ReconciliationService,
    RecordCountInput,
};
use crate::AppState;
use shared::PhysicalCount;

/// Record a physical count against a batch
pub async fn record_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<RecordCountInput>,
) -> AppResult<(StatusCode, Json<PhysicalCount>)> {
    let service = ReconciliationService::with_thresholds(
        state.db,
        state.config.compliance.detection_thresholds(),
    );
    let count = service
        .record_count(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(count)))
}

/// List a batch's physical counts, newest first
pub async fn get_batch_counts(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Vec<PhysicalCount>>> {
    let service = ReconciliationService::new(state.db);
    let counts = service
        .counts_for_batch(current_user.0.scope(), batch_id)
        .await?;
    Ok(Json(counts))
}

/// Reconciliation view for one batch
pub async fn get_batch_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<BatchReconciliation>> {
    let service = ReconciliationService::new(state.db);
    let view = service
        .reconcile_batch(current_user.0.scope(), batch_id)
        .await?;
    Ok(Json(view))
}

/// Reconciliation views for every live batch in a facility
pub async fn get_facility_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(facility_id): Path<Uuid>,
) -> AppResult<Json<Vec<BatchReconciliation>>> {
    let service = ReconciliationService::new(state.db);
    let views = service
        .reconcile_facility(current_user.0.scope(), facility_id)
        .await?;
    Ok(Json(views))
}

/// Justify a count's discrepancy; may open a loss/theft incident
pub async fn justify_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(count_id): Path<Uuid>,
    Json(input): Json<JustifyCountInput>,
) -> AppResult<Json<JustifyOutcome>> {
    let service = ReconciliationService::with_thresholds(
        state.db,
        state.config.compliance.detection_thresholds(),
    );
    let outcome = service
        .justify_count(current_user.0.scope(), current_user.0.user_id, count_id, input)
        .await?;
    Ok(Json(outcome))
}
