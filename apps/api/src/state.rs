use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::notify::Notifier;
use crate::screening::cache::ScoreCache;
use crate::screening::scorer::CandidateScorer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Holds the per-user analysis lock.
    pub redis: RedisClient,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Pluggable CV scorer. Default: LlmCandidateScorer.
    pub scorer: Arc<dyn CandidateScorer>,
    /// Default: PgScoreCache over `analysis_cache`.
    pub cache: Arc<dyn ScoreCache>,
    pub notifier: Notifier,
}
