//! HTTP handlers for regulatory report generation

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::compliance_report::ComplianceReportService;
use crate::AppState;
use shared::{DateRange, ReportType};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub facility_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// "csv" (default) or "json"
    pub format: Option<String>,
}

/// Generate a regulatory report and stream it as a CSV download
pub async fn generate_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(report_type): Path<String>,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let report_type = ReportType::from_str(&report_type).ok_or_else(|| AppError::Validation {
        field: "report_type".to_string(),
        message: format!("Unknown report type: {}", report_type),
        message_fr: format!("Type de rapport inconnu : {}", report_type),
    })?;

    let service = ComplianceReportService::new(state.db);
    let document = service
        .generate(
            current_user.0.scope(),
            report_type,
            query.facility_id,
            DateRange {
                start: query.start_date,
                end: query.end_date,
            },
        )
        .await?;

    if query.format.as_deref() == Some("json") {
        Ok(Json(document).into_response())
    } else {
        let csv = ComplianceReportService::to_csv(&document)?;
        let filename = format!(
            "{}_{}_{}.csv",
            report_type.as_str(),
            query.start_date,
            query.end_date
        );
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            csv,
        )
            .into_response())
    }
}
