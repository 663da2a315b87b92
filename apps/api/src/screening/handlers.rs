//! Axum route handlers for the Screening API.

use axum::{
    extract::{multipart::Field, Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::reports::AnalysisReport;
use crate::screening::pipeline::{run_analysis, AnalysisRequest, CvUpload};
use crate::screening::requirements::{extract_requirements, ProposedRequirement};
use crate::state::AppState;

const MAX_FILE_NAME_CHARS: usize = 200;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExtractRequirementsRequest {
    pub job_text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractRequirementsResponse {
    pub requirements: Vec<ProposedRequirement>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/requirements/extract
///
/// Proposes requirements from a job description for the recruiter to pick from.
/// Free of charge; credits are only spent on CV analysis.
pub async fn handle_extract_requirements(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<ExtractRequirementsRequest>,
) -> Result<Json<ExtractRequirementsResponse>, AppError> {
    let requirements = extract_requirements(&request.job_text, &state.llm).await?;
    Ok(Json(ExtractRequirementsResponse { requirements }))
}

/// POST /api/v1/analyses
///
/// Multipart fields:
/// - `job_text`: the job description
/// - `requirements`: a JSON array of strings, or one requirement per repeated field
/// - `cvs` (or `cvs[]`): one PDF per field
pub async fn handle_create_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, AppError> {
    let request = read_analysis_form(multipart).await?;
    let report = run_analysis(&state, &user, request).await?;
    Ok(Json(report))
}

// ────────────────────────────────────────────────────────────────────────────
// Multipart parsing
// ────────────────────────────────────────────────────────────────────────────

async fn read_analysis_form(mut multipart: Multipart) -> Result<AnalysisRequest, AppError> {
    let mut job_text: Option<String> = None;
    let mut requirements = Vec::new();
    let mut cvs = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "job_text" => job_text = Some(field_text(field).await?),
            "requirements" | "requirements[]" => {
                requirements.extend(parse_requirements_field(&field_text(field).await?)?);
            }
            "cvs" | "cvs[]" => {
                let file_name = sanitize_file_name(field.file_name(), cvs.len());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                cvs.push(CvUpload { file_name, bytes });
            }
            other => tracing::debug!("Ignoring unknown multipart field '{other}'"),
        }
    }

    Ok(AnalysisRequest {
        job_text: job_text
            .ok_or_else(|| AppError::Validation("job_text is required".to_string()))?,
        requirements,
        cvs,
    })
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {e}"))
}

/// A `requirements` field holds either a JSON array of strings or a single requirement.
pub fn parse_requirements_field(raw: &str) -> Result<Vec<String>, AppError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| {
            AppError::Validation(format!("requirements must be a JSON array of strings: {e}"))
        });
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![trimmed.to_string()])
}

/// Keeps the final path component, drops control characters and caps the length.
/// Uploads without a usable name get `cv-<n>.pdf`.
pub fn sanitize_file_name(raw: Option<&str>, index: usize) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("cv-{}.pdf", index + 1)
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_json_array() {
        let parsed = parse_requirements_field(r#"["Rust", "PostgreSQL"]"#).unwrap();
        assert_eq!(parsed, vec!["Rust", "PostgreSQL"]);
    }

    #[test]
    fn test_requirements_plain_value() {
        assert_eq!(
            parse_requirements_field("  5+ years of Rust ").unwrap(),
            vec!["5+ years of Rust"]
        );
        assert!(parse_requirements_field("   ").unwrap().is_empty());
    }

    #[test]
    fn test_requirements_malformed_json_is_rejected() {
        assert!(matches!(
            parse_requirements_field(r#"["Rust", 3]"#),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_sanitize_strips_paths_and_control_chars() {
        assert_eq!(sanitize_file_name(Some("../../etc/passwd"), 0), "passwd");
        assert_eq!(
            sanitize_file_name(Some("C:\\Users\\jo\\cv\u{0}.pdf"), 0),
            "cv.pdf"
        );
    }

    #[test]
    fn test_sanitize_falls_back_to_numbered_name() {
        assert_eq!(sanitize_file_name(None, 2), "cv-3.pdf");
        assert_eq!(sanitize_file_name(Some("dir/"), 0), "cv-1.pdf");
        assert_eq!(sanitize_file_name(Some(".."), 4), "cv-5.pdf");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = format!("{}.pdf", "a".repeat(500));
        assert_eq!(sanitize_file_name(Some(&long), 0).chars().count(), MAX_FILE_NAME_CHARS);
    }
}
