//! Axum route handlers for reading analysis reports.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::reports::export::{export_csv, export_file_name};
use crate::reports::store::{list_analyses, load_report};
use crate::reports::{AnalysisReport, AnalysisSummary};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisSummary>,
}

/// GET /api/v1/analyses
pub async fn handle_list_analyses(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<AnalysisListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let analyses = list_analyses(&state.db, user.id, limit).await?;
    Ok(Json(AnalysisListResponse { analyses }))
}

/// GET /api/v1/analyses/:id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<AnalysisReport>, AppError> {
    let report = load_report(&state.db, user.id, analysis_id).await?;
    Ok(Json(report))
}

/// GET /api/v1/analyses/:id/export
///
/// The ranked report as a CSV attachment.
pub async fn handle_export_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    Path(analysis_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_report(&state.db, user.id, analysis_id).await?;
    let body = export_csv(&report.analysis, &report.candidates)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(&report.analysis)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
