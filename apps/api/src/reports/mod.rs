//! Reports: ranked per-candidate results of an analysis, as JSON or CSV.

pub mod export;
pub mod handlers;
pub mod ranking;
pub mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::analysis::{AnalysisRow, CandidateResultRow};
use crate::screening::scorer::CandidateAssessment;

pub use ranking::{rank_candidates, RankedCandidate};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub status: String,
    pub job_text: String,
    pub requirements: Vec<String>,
    pub cv_count: i32,
    pub scored_count: i32,
    pub failed_count: i32,
    pub cached_count: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<AnalysisRow> for AnalysisSummary {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            status: row.status,
            job_text: row.job_text,
            requirements: row.requirements,
            cv_count: row.cv_count,
            scored_count: row.scored_count,
            failed_count: row.failed_count,
            cached_count: row.cached_count,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

/// Outcome for one uploaded CV.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    /// Zero-based upload position.
    pub position: usize,
    pub file_name: String,
    pub candidate_name: Option<String>,
    pub score: Option<u8>,
    pub cached: bool,
    pub assessment: Option<CandidateAssessment>,
    pub failure_reason: Option<String>,
}

impl CandidateResult {
    pub fn scored(
        position: usize,
        file_name: String,
        assessment: CandidateAssessment,
        score: u8,
        cached: bool,
    ) -> Self {
        Self {
            position,
            file_name,
            candidate_name: assessment
                .candidate_name
                .clone()
                .filter(|n| !n.trim().is_empty()),
            score: Some(score),
            cached,
            assessment: Some(assessment),
            failure_reason: None,
        }
    }

    pub fn failed(position: usize, file_name: String, reason: impl Into<String>) -> Self {
        Self {
            position,
            file_name,
            candidate_name: None,
            score: None,
            cached: false,
            assessment: None,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    /// Rebuilds a result from its stored row. A row whose assessment no longer
    /// deserializes is reported as failed rather than dropped.
    pub fn from_row(row: CandidateResultRow) -> Self {
        let position = row.position.max(0) as usize;
        let assessment = row
            .assessment
            .map(serde_json::from_value::<CandidateAssessment>)
            .transpose();

        match (row.score, assessment) {
            (Some(score), Ok(Some(assessment))) => Self::scored(
                position,
                row.file_name,
                assessment,
                score.clamp(0, 100) as u8,
                row.cached,
            ),
            (_, Err(e)) => {
                warn!("Stored assessment for result {} is unreadable: {e}", row.id);
                Self::failed(position, row.file_name, "Stored assessment is unreadable")
            }
            _ => Self::failed(
                position,
                row.file_name,
                row.failure_reason
                    .unwrap_or_else(|| "Analysis did not complete".to_string()),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis: AnalysisSummary,
    pub candidates: Vec<RankedCandidate>,
}

impl AnalysisReport {
    pub fn new(analysis: AnalysisSummary, results: Vec<CandidateResult>) -> Self {
        let candidates = rank_candidates(results, &analysis.requirements);
        Self {
            analysis,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(score: Option<i16>, assessment: Option<serde_json::Value>) -> CandidateResultRow {
        CandidateResultRow {
            id: Uuid::new_v4(),
            analysis_id: Uuid::new_v4(),
            position: 2,
            file_name: "jane.pdf".to_string(),
            s3_key: None,
            status: if score.is_some() { "scored" } else { "failed" }.to_string(),
            score,
            cached: true,
            assessment,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_row_restores_scored_result() {
        let result = CandidateResult::from_row(row(
            Some(75),
            Some(json!({
                "candidate_name": "Jane",
                "requirements": [{"requirement": "Rust", "status": "met"}],
                "summary": "Strong"
            })),
        ));
        assert_eq!(result.score, Some(75));
        assert_eq!(result.position, 2);
        assert_eq!(result.candidate_name.as_deref(), Some("Jane"));
        assert!(result.cached);
    }

    #[test]
    fn test_from_row_with_corrupt_assessment_is_failed() {
        let result = CandidateResult::from_row(row(Some(75), Some(json!({"nope": true}))));
        assert!(!result.is_scored());
        assert!(result.failure_reason.is_some());
    }

    #[test]
    fn test_from_row_failed_keeps_reason() {
        let mut failed = row(None, None);
        failed.failure_reason = Some("file is not a PDF".to_string());
        let result = CandidateResult::from_row(failed);
        assert_eq!(result.failure_reason.as_deref(), Some("file is not a PDF"));
    }

    #[test]
    fn test_blank_candidate_name_is_dropped() {
        let assessment = CandidateAssessment {
            candidate_name: Some("  ".to_string()),
            requirements: vec![],
            summary: String::new(),
        };
        let result = CandidateResult::scored(0, "a.pdf".to_string(), assessment, 0, false);
        assert!(result.candidate_name.is_none());
    }
}
