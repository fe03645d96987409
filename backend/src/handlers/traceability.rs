//! HTTP handlers for traceability ledger queries
//!
//! Read-only: ledger events are appended by the mutating services, never
//! through a handler.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::traceability::TraceabilityService;
use crate::AppState;
use shared::{DateRange, TraceabilityEvent};

#[derive(Debug, Deserialize)]
pub struct FacilityEventsQuery {
    pub facility_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Get the full event history for a batch, in replay order
pub async fn get_batch_events(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Vec<TraceabilityEvent>>> {
    let service = TraceabilityService::new(state.db);
    let events = service
        .events_for_batch(current_user.0.scope(), batch_id)
        .await?;
    Ok(Json(events))
}

/// List a facility's events within a date range
pub async fn list_facility_events(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<FacilityEventsQuery>,
) -> AppResult<Json<Vec<TraceabilityEvent>>> {
    let service = TraceabilityService::new(state.db);
    let events = service
        .events_for_facility_in_range(
            current_user.0.scope(),
            query.facility_id,
            DateRange {
                start: query.start_date,
                end: query.end_date,
            },
        )
        .await?;
    Ok(Json(events))
}
