//! Persistence for analyses and their per-candidate results.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::analysis::{AnalysisRow, CandidateResultRow};
use crate::reports::{AnalysisReport, AnalysisSummary, CandidateResult};

/// Counts written back to the analysis row once every CV has an outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub scored: i32,
    pub failed: i32,
    pub cached: i32,
}

impl OutcomeCounts {
    pub fn tally(results: &[CandidateResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            if r.is_scored() {
                acc.scored += 1;
                if r.cached {
                    acc.cached += 1;
                }
            } else {
                acc.failed += 1;
            }
            acc
        })
    }

    /// One credit back per CV that produced no score.
    pub fn credits_to_refund(&self) -> i32 {
        self.failed
    }

    /// An analysis where nothing could be scored is reported as failed.
    pub fn final_status(&self) -> &'static str {
        if self.scored > 0 {
            "completed"
        } else {
            "failed"
        }
    }
}

pub async fn insert_analysis(
    pool: &PgPool,
    analysis_id: Uuid,
    user_id: Uuid,
    job_text: &str,
    requirements: &[String],
    cv_count: i32,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO analyses (id, user_id, job_text, requirements, status, cv_count)
        VALUES ($1, $2, $3, $4, 'processing', $5)
        "#,
    )
    .bind(analysis_id)
    .bind(user_id)
    .bind(job_text)
    .bind(requirements)
    .bind(cv_count)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes every candidate result and closes the analysis, inside the caller's transaction.
pub async fn finalize_analysis(
    conn: &mut PgConnection,
    analysis_id: Uuid,
    results: &[CandidateResult],
    s3_keys: &[Option<String>],
) -> Result<AnalysisRow, AppError> {
    for result in results {
        let assessment = result
            .assessment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize assessment: {e}")))?;
        let s3_key = s3_keys.get(result.position).cloned().flatten();

        sqlx::query(
            r#"
            INSERT INTO candidate_results
                (analysis_id, position, file_name, s3_key, status, score, cached,
                 assessment, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(analysis_id)
        .bind(result.position as i32)
        .bind(&result.file_name)
        .bind(s3_key)
        .bind(if result.is_scored() { "scored" } else { "failed" })
        .bind(result.score.map(i16::from))
        .bind(result.cached)
        .bind(assessment)
        .bind(&result.failure_reason)
        .execute(&mut *conn)
        .await?;
    }

    let counts = OutcomeCounts::tally(results);
    let row = sqlx::query_as::<_, AnalysisRow>(
        r#"
        UPDATE analyses
        SET status = $2, scored_count = $3, failed_count = $4, cached_count = $5,
            completed_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(analysis_id)
    .bind(counts.final_status())
    .bind(counts.scored)
    .bind(counts.failed)
    .bind(counts.cached)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Marks an analysis that aborted before its results could be written.
pub async fn mark_failed(pool: &PgPool, analysis_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE analyses SET status = 'failed', completed_at = now() WHERE id = $1 AND status = 'processing'",
    )
    .bind(analysis_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_analyses(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<AnalysisSummary>, AppError> {
    let rows = sqlx::query_as::<_, AnalysisRow>(
        "SELECT * FROM analyses WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AnalysisSummary::from).collect())
}

/// Loads a full report. Analyses owned by someone else are reported as not found.
pub async fn load_report(
    pool: &PgPool,
    user_id: Uuid,
    analysis_id: Uuid,
) -> Result<AnalysisReport, AppError> {
    let analysis = sqlx::query_as::<_, AnalysisRow>(
        "SELECT * FROM analyses WHERE id = $1 AND user_id = $2",
    )
    .bind(analysis_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Analysis {analysis_id} not found")))?;

    let rows = sqlx::query_as::<_, CandidateResultRow>(
        "SELECT * FROM candidate_results WHERE analysis_id = $1 ORDER BY position",
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;

    let results = rows.into_iter().map(CandidateResult::from_row).collect();
    Ok(AnalysisReport::new(analysis.into(), results))
}
