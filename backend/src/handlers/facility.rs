//! HTTP handlers for facility and cultivation area lookups

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::facility::FacilityService;
use crate::AppState;
use shared::{CultivationArea, DiscrepancyReason, Facility};

/// Cultivation area with its live capacity usage
#[derive(Debug, Serialize)]
pub struct CultivationAreaResponse {
    pub area: CultivationArea,
    pub in_use_units: Decimal,
}

/// Get a facility by ID
pub async fn get_facility(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(facility_id): Path<Uuid>,
) -> AppResult<Json<Facility>> {
    let service = FacilityService::new(state.db);
    let facility = service
        .get_facility(current_user.0.scope(), facility_id)
        .await?;
    Ok(Json(facility))
}

/// Get a cultivation area by ID, with the units currently in use
pub async fn get_cultivation_area(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(area_id): Path<Uuid>,
) -> AppResult<Json<CultivationAreaResponse>> {
    let service = FacilityService::new(state.db);
    let area = service
        .get_cultivation_area(current_user.0.scope(), area_id)
        .await?;
    let in_use_units = service.area_in_use_units(area.id).await?;
    Ok(Json(CultivationAreaResponse {
        area,
        in_use_units,
    }))
}

/// Get a discrepancy reason by ID
pub async fn get_discrepancy_reason(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(reason_id): Path<Uuid>,
) -> AppResult<Json<DiscrepancyReason>> {
    let service = FacilityService::new(state.db);
    let reason = service
        .get_discrepancy_reason(current_user.0.scope(), reason_id)
        .await?;
    Ok(Json(reason))
}
