//! Analysis pipeline: scores a batch of CVs against the selected requirements.
//!
//! Flow: validate → lock → reserve credits → insert analysis → (store PDFs ∥ score CVs)
//!       → persist results + refund failed CVs → release lock → notify.
//!
//! Each CV is scored independently. A CV that cannot be read or assessed becomes a
//! failed result with a reason and its credit is refunded; it never aborts the batch.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::AnalysisLimits;
use crate::credits::ledger::CreditReservation;
use crate::documents::{anonymize, excerpt, extract_text};
use crate::errors::AppError;
use crate::notify::Notifier;
use crate::reports::store::OutcomeCounts;
use crate::reports::{AnalysisReport, CandidateResult};
use crate::screening::backend::{AnalysisBackend, PgAnalysisBackend};
use crate::screening::cache::{cache_key, from_cached_form, to_cached_form, ScoreCache};
use crate::screening::requirements::normalize_selection;
use crate::screening::scorer::{score_assessment, CandidateScorer};
use crate::state::AppState;

pub const MAX_JOB_TEXT_CHARS: usize = 20_000;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CvUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub job_text: String,
    pub requirements: Vec<String>,
    pub cvs: Vec<CvUpload>,
}

/// Everything a scoring task needs. Cheap to clone into each task.
#[derive(Clone)]
pub struct ScoringContext {
    pub scorer: Arc<dyn CandidateScorer>,
    pub cache: Arc<dyn ScoreCache>,
    pub job_text: Arc<str>,
    pub requirements: Arc<[String]>,
    pub concurrency: usize,
    pub excerpt_chars: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

/// Checks the request against the configured limits and returns it normalized.
pub fn validate_request(
    request: AnalysisRequest,
    limits: &AnalysisLimits,
) -> Result<AnalysisRequest, AppError> {
    let job_text = request.job_text.trim().to_string();
    if job_text.is_empty() {
        return Err(AppError::Validation("job_text cannot be empty".to_string()));
    }
    if job_text.chars().count() > MAX_JOB_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "job_text exceeds {MAX_JOB_TEXT_CHARS} characters"
        )));
    }

    let requirements = normalize_selection(request.requirements)?;

    if request.cvs.is_empty() {
        return Err(AppError::Validation("Upload at least one CV".to_string()));
    }
    if request.cvs.len() > limits.max_cvs {
        return Err(AppError::Validation(format!(
            "At most {} CVs can be analysed at once, got {}",
            limits.max_cvs,
            request.cvs.len()
        )));
    }
    for cv in &request.cvs {
        if cv.bytes.is_empty() {
            return Err(AppError::Validation(format!("{} is empty", cv.file_name)));
        }
        if cv.bytes.len() > limits.max_cv_bytes {
            return Err(AppError::Validation(format!(
                "{} exceeds the {} byte limit per CV",
                cv.file_name, limits.max_cv_bytes
            )));
        }
    }

    Ok(AnalysisRequest {
        job_text,
        requirements,
        cvs: request.cvs,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Fan-out
// ────────────────────────────────────────────────────────────────────────────

/// Runs `task` for every item with at most `limit` in flight.
///
/// Output keeps input order. A task that panicked leaves `None` in its slot.
pub async fn bounded_fan_out<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();
    let total = items.len();

    for (position, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let fut = task(position, item);
        tasks.spawn(async move {
            // the semaphore is never closed, so a permit always arrives
            let _permit = semaphore.acquire_owned().await.ok();
            (position, fut.await)
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, output)) => slots[position] = Some(output),
            Err(e) => error!("Scoring task aborted: {e}"),
        }
    }
    slots
}

/// Scores every CV, returning one result per upload in upload order.
pub async fn score_documents(documents: Vec<CvUpload>, ctx: &ScoringContext) -> Vec<CandidateResult> {
    let file_names: Vec<String> = documents.iter().map(|d| d.file_name.clone()).collect();

    let slots = bounded_fan_out(documents, ctx.concurrency, |position, doc| {
        let ctx = ctx.clone();
        async move { score_document(position, doc, &ctx).await }
    })
    .await;

    slots
        .into_iter()
        .zip(file_names)
        .enumerate()
        .map(|(position, (slot, file_name))| {
            slot.unwrap_or_else(|| {
                CandidateResult::failed(position, file_name, "Internal error while scoring this CV")
            })
        })
        .collect()
}

async fn score_document(position: usize, doc: CvUpload, ctx: &ScoringContext) -> CandidateResult {
    match extract_text(doc.bytes).await {
        Ok(text) => score_text(position, doc.file_name, &text, ctx).await,
        Err(e) => {
            warn!("CV #{position} could not be read: {e}");
            CandidateResult::failed(position, doc.file_name, e.to_string())
        }
    }
}

/// Anonymizes extracted CV text and scores it, consulting the cache first.
async fn score_text(
    position: usize,
    file_name: String,
    text: &str,
    ctx: &ScoringContext,
) -> CandidateResult {
    let anonymized = anonymize(text);
    debug!(
        "CV #{position}: redacted {} spans {:?}",
        anonymized.redactions.total(),
        anonymized.redactions
    );

    let cv_excerpt = excerpt(&anonymized.text, ctx.excerpt_chars);
    let key = cache_key(cv_excerpt, &ctx.requirements, &ctx.job_text);

    match ctx.cache.get(&key).await {
        Ok(Some(cached)) => {
            debug!("CV #{position}: cache hit");
            let assessment = from_cached_form(&cached, &ctx.requirements);
            let score = score_assessment(&assessment, &ctx.requirements);
            return CandidateResult::scored(position, file_name, assessment, score, true);
        }
        Ok(None) => {}
        Err(e) => warn!("Score cache lookup failed, treating as miss: {e:#}"),
    }

    let assessment = match ctx
        .scorer
        .assess(&ctx.job_text, &ctx.requirements, cv_excerpt)
        .await
    {
        Ok(assessment) => assessment.aligned_to(&ctx.requirements),
        Err(e) => {
            warn!("CV #{position} could not be assessed: {e}");
            return CandidateResult::failed(position, file_name, "The CV could not be assessed");
        }
    };

    if let Err(e) = ctx
        .cache
        .put(&key, &to_cached_form(&assessment, &ctx.requirements))
        .await
    {
        warn!("Score cache write failed: {e:#}");
    }

    let score = score_assessment(&assessment, &ctx.requirements);
    CandidateResult::scored(position, file_name, assessment, score, false)
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestration
// ────────────────────────────────────────────────────────────────────────────

/// Runs a full analysis for `user` and returns the ranked report.
///
/// Everything after validation runs on its own task: a client that hangs up
/// mid-request cannot cancel the cleanup of a reservation or the lock release.
pub async fn run_analysis(
    state: &AppState,
    user: &AuthUser,
    request: AnalysisRequest,
) -> Result<AnalysisReport, AppError> {
    // Step 1: Validate
    let request = validate_request(request, &state.config.analysis)?;

    let state = state.clone();
    let user = user.clone();
    run_detached(async move {
        let backend = PgAnalysisBackend::from_state(&state);
        let report = execute_analysis(
            &backend,
            state.scorer.clone(),
            state.cache.clone(),
            &state.config.analysis,
            user.id,
            request,
        )
        .await?;

        // Step 8: Notify (detached, never affects the response)
        notify_completion(&state.notifier, &user, &report);
        Ok::<_, AppError>(report)
    })
    .await
}

/// Runs `work` on its own task and waits for it. Dropping the returned future
/// does not cancel the work.
pub async fn run_detached<T, F>(work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AppError>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Analysis task failed: {e}")))?
}

/// Steps 2 to 7 of an analysis over a validated request.
///
/// Steps:
/// 2. per-user lock (held → 409)
/// 3. reserve one credit per CV (insufficient → 402)
/// 4. record the analysis as processing
/// 5. store originals while scoring the batch
/// 6. persist results, close the analysis and refund failed CVs in one transaction
/// 7. release the lock
///
/// Any error after step 3 returns the whole reservation.
pub async fn execute_analysis<B: AnalysisBackend>(
    backend: &B,
    scorer: Arc<dyn CandidateScorer>,
    cache: Arc<dyn ScoreCache>,
    limits: &AnalysisLimits,
    user_id: Uuid,
    request: AnalysisRequest,
) -> Result<AnalysisReport, AppError> {
    // Step 2: Lock
    let lock = backend.acquire_lock(user_id).await?.ok_or_else(|| {
        AppError::Conflict("An analysis is already running for this account".to_string())
    })?;

    let outcome = run_locked(backend, scorer, cache, limits, user_id, request).await;

    // Step 7: Release the lock on every path
    if let Err(e) = backend.release_lock(lock).await {
        warn!("Failed to release analysis lock for user {user_id}: {e:#}");
    }

    outcome
}

async fn run_locked<B: AnalysisBackend>(
    backend: &B,
    scorer: Arc<dyn CandidateScorer>,
    cache: Arc<dyn ScoreCache>,
    limits: &AnalysisLimits,
    user_id: Uuid,
    request: AnalysisRequest,
) -> Result<AnalysisReport, AppError> {
    let analysis_id = Uuid::new_v4();
    let cv_count = request.cvs.len() as i32;

    // Step 3: Reserve credits
    let reservation = backend.reserve(user_id, analysis_id, cv_count).await?;

    let ctx = ScoringContext {
        scorer,
        cache,
        job_text: Arc::from(request.job_text.as_str()),
        requirements: Arc::from(request.requirements.as_slice()),
        concurrency: limits.concurrency,
        excerpt_chars: limits.excerpt_chars,
    };

    match score_and_persist(backend, &ctx, &reservation, request).await {
        Ok(report) => Ok(report),
        Err(e) => {
            error!("Analysis {analysis_id} aborted: {e}");
            backend.abort(&reservation).await;
            Err(e)
        }
    }
}

async fn score_and_persist<B: AnalysisBackend>(
    backend: &B,
    ctx: &ScoringContext,
    reservation: &CreditReservation,
    request: AnalysisRequest,
) -> Result<AnalysisReport, AppError> {
    let analysis_id = reservation.analysis_id;
    let user_id = reservation.user_id;

    // Step 4: Record the analysis
    backend
        .open_analysis(
            analysis_id,
            user_id,
            &request.job_text,
            &request.requirements,
            request.cvs.len() as i32,
        )
        .await?;
    info!(
        "Analysis {analysis_id}: scoring {} CVs against {} requirements for user {user_id}",
        request.cvs.len(),
        request.requirements.len(),
    );

    // Step 5: Store originals and score concurrently
    let files: Vec<Bytes> = request.cvs.iter().map(|cv| cv.bytes.clone()).collect();
    let (s3_keys, results) = tokio::join!(
        backend.store_originals(user_id, analysis_id, &files),
        score_documents(request.cvs, ctx),
    );

    // Step 6: Persist results and refund failed CVs atomically
    let refund = OutcomeCounts::tally(&results).credits_to_refund();
    let summary = backend.settle(reservation, &results, &s3_keys, refund).await?;

    info!(
        "Analysis {analysis_id} {}: scored={} failed={} cached={}",
        summary.status, summary.scored_count, summary.failed_count, summary.cached_count
    );

    Ok(AnalysisReport::new(summary, results))
}

fn notify_completion(notifier: &Notifier, user: &AuthUser, report: &AnalysisReport) {
    let Some(email) = user.email.clone() else {
        return;
    };
    if !notifier.is_enabled() {
        return;
    }
    let notifier = notifier.clone();
    let report = report.clone();
    tokio::spawn(async move {
        notifier.send_analysis_complete(&email, &report).await;
    });
}
