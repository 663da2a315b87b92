//! Side effects of an analysis run: lock, ledger, analysis rows and file storage.
//!
//! The pipeline drives these through `AnalysisBackend`, which keeps the credit
//! reconciliation rules in `pipeline.rs` independent of Postgres and Redis.
//! `PgAnalysisBackend` is the production implementation.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::credits::ledger::{self, CreditReservation};
use crate::errors::AppError;
use crate::reports::{store, AnalysisSummary, CandidateResult};
use crate::screening::lock::AnalysisLock;
use crate::state::AppState;
use crate::storage;

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    type Lock: Send;

    /// `None` when another analysis already holds the user's lock.
    async fn acquire_lock(&self, user_id: Uuid) -> Result<Option<Self::Lock>, AppError>;

    async fn release_lock(&self, lock: Self::Lock) -> anyhow::Result<()>;

    async fn reserve(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
        amount: i32,
    ) -> Result<CreditReservation, AppError>;

    /// Records the analysis as processing.
    async fn open_analysis(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        job_text: &str,
        requirements: &[String],
        cv_count: i32,
    ) -> Result<(), AppError>;

    /// Best effort: one slot per file, `None` where storage failed.
    async fn store_originals(&self, user_id: Uuid, analysis_id: Uuid, files: &[Bytes]) -> Vec<Option<String>>;

    /// Persists results, closes the analysis and refunds `refund` credits, atomically.
    async fn settle(
        &self,
        reservation: &CreditReservation,
        results: &[CandidateResult],
        s3_keys: &[Option<String>],
        refund: i32,
    ) -> Result<AnalysisSummary, AppError>;

    /// Returns the whole reservation and marks the analysis failed. Never fails.
    async fn abort(&self, reservation: &CreditReservation);
}

pub struct PgAnalysisBackend {
    db: PgPool,
    redis: RedisClient,
    s3: S3Client,
    bucket: String,
    lock_ttl_secs: u64,
}

impl PgAnalysisBackend {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            redis: state.redis.clone(),
            s3: state.s3.clone(),
            bucket: state.config.s3_bucket.clone(),
            lock_ttl_secs: state.config.analysis.lock_ttl_secs,
        }
    }
}

#[async_trait]
impl AnalysisBackend for PgAnalysisBackend {
    type Lock = AnalysisLock;

    async fn acquire_lock(&self, user_id: Uuid) -> Result<Option<AnalysisLock>, AppError> {
        AnalysisLock::acquire(&self.redis, user_id, self.lock_ttl_secs)
            .await
            .map_err(AppError::Internal)
    }

    async fn release_lock(&self, lock: AnalysisLock) -> anyhow::Result<()> {
        lock.release().await
    }

    async fn reserve(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
        amount: i32,
    ) -> Result<CreditReservation, AppError> {
        Ok(ledger::reserve(&self.db, user_id, analysis_id, amount).await?)
    }

    async fn open_analysis(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        job_text: &str,
        requirements: &[String],
        cv_count: i32,
    ) -> Result<(), AppError> {
        store::insert_analysis(&self.db, analysis_id, user_id, job_text, requirements, cv_count).await
    }

    async fn store_originals(&self, user_id: Uuid, analysis_id: Uuid, files: &[Bytes]) -> Vec<Option<String>> {
        storage::store_cvs(&self.s3, &self.bucket, user_id, analysis_id, files).await
    }

    async fn settle(
        &self,
        reservation: &CreditReservation,
        results: &[CandidateResult],
        s3_keys: &[Option<String>],
        refund: i32,
    ) -> Result<AnalysisSummary, AppError> {
        let mut tx = self.db.begin().await?;
        let row = store::finalize_analysis(&mut tx, reservation.analysis_id, results, s3_keys).await?;
        ledger::refund(&mut tx, reservation, refund).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn abort(&self, reservation: &CreditReservation) {
        let analysis_id = reservation.analysis_id;

        let refund = async {
            let mut tx = self.db.begin().await?;
            ledger::refund(&mut tx, reservation, reservation.debited.total()).await?;
            tx.commit().await?;
            Ok::<(), AppError>(())
        };
        if let Err(e) = refund.await {
            error!("Failed to refund reservation for analysis {analysis_id}: {e}");
        }

        if let Err(e) = store::mark_failed(&self.db, analysis_id).await {
            warn!("Could not mark analysis {analysis_id} as failed: {e}");
        }
    }
}
