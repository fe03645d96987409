//! HTTP handlers for loss/theft incident reports

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::loss_theft::{
    AnalyzeShortageInput, CreateReportInput, HcReportability, HcSubmissionInput, LossTheftService,
    ReportFilter, UpdateInvestigationInput, UpdateReportInput,
};
use crate::AppState;
use shared::{IncidentType, InvestigationStatus, LossTheftReport};

#[derive(Debug, Deserialize)]
pub struct ListReportsQuery {
    pub facility_id: Option<Uuid>,
    pub incident_type: Option<String>,
    pub investigation_status: Option<String>,
}

/// File a loss/theft incident report
pub async fn create_loss_theft_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateReportInput>,
) -> AppResult<(StatusCode, Json<LossTheftReport>)> {
    let service = LossTheftService::new(state.db);
    let report = service
        .create_report(current_user.0.scope(), current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// List incident reports
pub async fn list_loss_theft_reports(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListReportsQuery>,
) -> AppResult<Json<Vec<LossTheftReport>>> {
    let incident_type = match query.incident_type.as_deref() {
        Some(raw) => Some(IncidentType::from_str(raw).ok_or_else(|| AppError::Validation {
            field: "incident_type".to_string(),
            message: format!("Unknown incident type: {}", raw),
            message_fr: format!("Type d'incident inconnu : {}", raw),
        })?),
        None => None,
    };
    let investigation_status = match query.investigation_status.as_deref() {
        Some(raw) => {
            Some(
                InvestigationStatus::from_str(raw).ok_or_else(|| AppError::Validation {
                    field: "investigation_status".to_string(),
                    message: format!("Unknown investigation status: {}", raw),
                    message_fr: format!("Statut d'enquête inconnu : {}", raw),
                })?,
            )
        }
        None => None,
    };

    let filter = ReportFilter {
        facility_id: query.facility_id,
        incident_type,
        investigation_status,
    };

    let service = LossTheftService::new(state.db);
    let reports = service.list_reports(current_user.0.scope(), filter).await?;
    Ok(Json(reports))
}

/// Get an incident report by ID
pub async fn get_loss_theft_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<LossTheftReport>> {
    let service = LossTheftService::new(state.db);
    let report = service.get_report(current_user.0.scope(), report_id).await?;
    Ok(Json(report))
}

/// Update an incident report's core facts (pre-submission only)
pub async fn update_loss_theft_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<UpdateReportInput>,
) -> AppResult<Json<LossTheftReport>> {
    let service = LossTheftService::new(state.db);
    let report = service
        .update_report(current_user.0.scope(), report_id, input)
        .await?;
    Ok(Json(report))
}

/// Update an incident's investigation fields
pub async fn update_investigation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<UpdateInvestigationInput>,
) -> AppResult<Json<LossTheftReport>> {
    let service = LossTheftService::new(state.db);
    let report = service
        .update_investigation(current_user.0.scope(), report_id, input)
        .await?;
    Ok(Json(report))
}

/// Record the Health Canada submission for an incident
pub async fn submit_to_health_canada(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<HcSubmissionInput>,
) -> AppResult<Json<LossTheftReport>> {
    let service = LossTheftService::new(state.db);
    let report = service
        .mark_reported_to_health_canada(current_user.0.scope(), report_id, input)
        .await?;
    Ok(Json(report))
}

/// Whether an incident crosses the Health Canada reporting bar
pub async fn get_hc_reportability(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<HcReportability>> {
    let service = LossTheftService::new(state.db);
    let reportability = service
        .reportability(current_user.0.scope(), report_id)
        .await?;
    Ok(Json(reportability))
}

/// Run shortage analysis for a batch against an observed quantity
pub async fn analyze_batch_shortage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<AnalyzeShortageInput>,
) -> AppResult<Json<Option<LossTheftReport>>> {
    let service = LossTheftService::with_thresholds(
        state.db,
        state.config.compliance.detection_thresholds(),
    );
    let report = service
        .analyze(current_user.0.scope(), current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(report))
}
