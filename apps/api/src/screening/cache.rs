//! Score cache keyed by content hash.
//!
//! The key covers everything the model sees that can change its verdict: the
//! anonymized excerpt, the selected requirements and the job description, plus
//! the model name. Re-uploading the same CV for the same role is then free of
//! model calls.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::llm_client::MODEL;
use crate::screening::scorer::CandidateAssessment;

/// Bump when prompts or the assessment schema change.
const CACHE_VERSION: &str = "v2";
const SEPARATOR: &str = "\u{1f}";

/// Hex SHA-256 over the normalized inputs of one assessment.
///
/// Requirements are normalized and sorted, so selection order does not matter.
pub fn cache_key(cv_excerpt: &str, requirements: &[String], job_text: &str) -> String {
    let mut sorted: Vec<String> = requirements.iter().map(|r| normalize(r)).collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(CACHE_VERSION);
    hasher.update(SEPARATOR);
    hasher.update(MODEL);
    hasher.update(SEPARATOR);
    hasher.update(normalize(cv_excerpt));
    hasher.update(SEPARATOR);
    hasher.update(sorted.join(SEPARATOR));
    hasher.update(SEPARATOR);
    hasher.update(normalize(job_text));

    format!("{:x}", hasher.finalize())
}

/// Lowercases and collapses all whitespace runs to a single space.
pub(crate) fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Order-independent form of an assessment, as written to the cache.
///
/// The key ignores selection order, so an entry carries one item per requirement
/// sorted by normalized text and no positions. Positions are meaningful only
/// against the selection that produced them.
pub fn to_cached_form(assessment: &CandidateAssessment, requirements: &[String]) -> CandidateAssessment {
    let mut cached = assessment.aligned_to(requirements);
    for item in &mut cached.requirements {
        item.index = None;
    }
    cached.requirements.sort_by_key(|item| normalize(&item.requirement));
    cached
}

/// Reads a cached entry back in the caller's selection order.
pub fn from_cached_form(cached: &CandidateAssessment, requirements: &[String]) -> CandidateAssessment {
    cached.aligned_to(requirements)
}

/// Storage for cached assessments.
///
/// Callers treat errors as cache misses; a broken cache must never fail an analysis.
#[async_trait]
pub trait ScoreCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CandidateAssessment>>;
    async fn put(&self, key: &str, assessment: &CandidateAssessment) -> anyhow::Result<()>;
}

/// `analysis_cache` table with a read-side TTL.
pub struct PgScoreCache {
    pool: PgPool,
    ttl_days: i32,
}

impl PgScoreCache {
    pub fn new(pool: PgPool, ttl_days: i32) -> Self {
        Self { pool, ttl_days }
    }
}

#[async_trait]
impl ScoreCache for PgScoreCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CandidateAssessment>> {
        let row: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            UPDATE analysis_cache
            SET hit_count = hit_count + 1
            WHERE cache_key = $1
              AND created_at > now() - make_interval(days => $2)
            RETURNING assessment
            "#,
        )
        .bind(key)
        .bind(self.ttl_days)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(serde_json::from_value).transpose()?)
    }

    async fn put(&self, key: &str, assessment: &CandidateAssessment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_cache (cache_key, assessment)
            VALUES ($1, $2)
            ON CONFLICT (cache_key) DO UPDATE
            SET assessment = EXCLUDED.assessment,
                created_at = now(),
                hit_count = 0
            "#,
        )
        .bind(key)
        .bind(serde_json::to_value(assessment)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
