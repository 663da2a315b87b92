//! Candidate scoring: pluggable, trait-based assessment of one CV against the
//! selected requirements.
//!
//! The model only classifies each requirement as met / partial / missing. The
//! numeric score is derived here, so it is reproducible and comparable across
//! candidates and across cache hits.
//!
//! `AppState` holds an `Arc<dyn CandidateScorer>`; tests swap in doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, FAIRNESS_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::screening::cache::normalize;
use crate::screening::prompts::{ASSESSMENT_PROMPT_TEMPLATE, ASSESSMENT_SYSTEM};

/// Extra model calls when the output covers none of the requirements or is not valid JSON.
const MAX_ASSESSMENT_RETRIES: u32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Met,
    Partial,
    Missing,
}

impl RequirementStatus {
    pub fn weight(self) -> f64 {
        match self {
            RequirementStatus::Met => 1.0,
            RequirementStatus::Partial => 0.5,
            RequirementStatus::Missing => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequirementStatus::Met => "met",
            RequirementStatus::Partial => "partial",
            RequirementStatus::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementAssessment {
    /// 1-based position in the prompt's numbered list.
    #[serde(default)]
    pub index: Option<usize>,
    pub requirement: String,
    pub status: RequirementStatus,
    #[serde(default)]
    pub evidence: String,
}

/// The model's verdict for one CV. Stored as JSONB in the cache and in results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAssessment {
    #[serde(default)]
    pub candidate_name: Option<String>,
    pub requirements: Vec<RequirementAssessment>,
    #[serde(default)]
    pub summary: String,
}

impl CandidateAssessment {
    /// Status for one selected requirement.
    ///
    /// Matches on the requirement text first (case and whitespace insensitive),
    /// then on the numbered position. Anything the model skipped counts as missing.
    pub fn status_for(&self, requirements: &[String], position: usize) -> RequirementStatus {
        self.item_for(requirements, position)
            .map(|r| r.status)
            .unwrap_or(RequirementStatus::Missing)
    }

    fn item_for(&self, requirements: &[String], position: usize) -> Option<&RequirementAssessment> {
        let wanted = normalize(&requirements[position]);
        self.requirements
            .iter()
            .find(|r| normalize(&r.requirement) == wanted)
            .or_else(|| self.requirements.iter().find(|r| r.index == Some(position + 1)))
    }

    /// Rewrites the verdict as exactly one item per selected requirement, in
    /// selection order, each carrying the exact requirement text and its
    /// 1-based position. Model items that match nothing are dropped.
    pub fn aligned_to(&self, requirements: &[String]) -> CandidateAssessment {
        let items = requirements
            .iter()
            .enumerate()
            .map(|(position, text)| {
                let found = self.item_for(requirements, position);
                RequirementAssessment {
                    index: Some(position + 1),
                    requirement: text.clone(),
                    status: found.map_or(RequirementStatus::Missing, |r| r.status),
                    evidence: found.map(|r| r.evidence.clone()).unwrap_or_default(),
                }
            })
            .collect();

        CandidateAssessment {
            candidate_name: self.candidate_name.clone(),
            requirements: items,
            summary: self.summary.clone(),
        }
    }

    pub fn statuses(&self, requirements: &[String]) -> Vec<RequirementStatus> {
        (0..requirements.len())
            .map(|i| self.status_for(requirements, i))
            .collect()
    }

    pub fn met_count(&self, requirements: &[String]) -> usize {
        self.statuses(requirements)
            .into_iter()
            .filter(|s| *s == RequirementStatus::Met)
            .count()
    }

    fn covers_any(&self, requirements: &[String]) -> bool {
        let wanted: Vec<String> = requirements.iter().map(|r| normalize(r)).collect();
        self.requirements.iter().any(|r| {
            r.index.is_some_and(|i| (1..=requirements.len()).contains(&i))
                || wanted.contains(&normalize(&r.requirement))
        })
    }
}

/// 0–100 score: mean status weight over the selected requirements.
pub fn score_assessment(assessment: &CandidateAssessment, requirements: &[String]) -> u8 {
    if requirements.is_empty() {
        return 0;
    }
    let total: f64 = assessment
        .statuses(requirements)
        .into_iter()
        .map(RequirementStatus::weight)
        .sum();
    ((total / requirements.len() as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Assesses one anonymized CV excerpt against the selected requirements.
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn assess(
        &self,
        job_text: &str,
        requirements: &[String],
        cv_excerpt: &str,
    ) -> Result<CandidateAssessment, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmCandidateScorer: default implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmCandidateScorer {
    llm: LlmClient,
}

impl LlmCandidateScorer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CandidateScorer for LlmCandidateScorer {
    async fn assess(
        &self,
        job_text: &str,
        requirements: &[String],
        cv_excerpt: &str,
    ) -> Result<CandidateAssessment, AppError> {
        let prompt = build_assessment_prompt(job_text, requirements, cv_excerpt)?;

        for attempt in 0..=MAX_ASSESSMENT_RETRIES {
            match self
                .llm
                .call_json::<CandidateAssessment>(&prompt, ASSESSMENT_SYSTEM)
                .await
            {
                Ok(assessment) if assessment.covers_any(requirements) => return Ok(assessment),
                Ok(_) => warn!(
                    "Assessment attempt {}/{} covered none of the requirements, retrying",
                    attempt + 1,
                    MAX_ASSESSMENT_RETRIES + 1
                ),
                Err(LlmError::Parse(e)) => warn!(
                    "Assessment attempt {}/{} returned malformed JSON ({e}), retrying",
                    attempt + 1,
                    MAX_ASSESSMENT_RETRIES + 1
                ),
                Err(e) => return Err(AppError::Llm(format!("CV assessment failed: {e}"))),
            }
        }

        Err(AppError::Llm(format!(
            "CV assessment failed after {} attempts: model output did not match the requirements",
            MAX_ASSESSMENT_RETRIES + 1
        )))
    }
}

fn build_assessment_prompt(
    job_text: &str,
    requirements: &[String],
    cv_excerpt: &str,
) -> Result<String, AppError> {
    let numbered: Vec<serde_json::Value> = requirements
        .iter()
        .enumerate()
        .map(|(i, text)| serde_json::json!({ "index": i + 1, "requirement": text }))
        .collect();
    let requirements_json = serde_json::to_string_pretty(&numbered)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize requirements: {e}")))?;

    Ok(fill_template(
        ASSESSMENT_PROMPT_TEMPLATE,
        &[
            ("json_only", JSON_ONLY_SYSTEM),
            ("fairness_instruction", FAIRNESS_INSTRUCTION),
            ("job_text", job_text),
            ("requirements_json", &requirements_json),
            ("cv_text", cv_excerpt),
        ],
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn reqs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn item(index: Option<usize>, requirement: &str, status: RequirementStatus) -> RequirementAssessment {
        RequirementAssessment {
            index,
            requirement: requirement.to_string(),
            status,
            evidence: String::new(),
        }
    }

    fn assessment(items: Vec<RequirementAssessment>) -> CandidateAssessment {
        CandidateAssessment {
            candidate_name: None,
            requirements: items,
            summary: "ok".to_string(),
        }
    }

    #[test]
    fn test_all_met_scores_100() {
        let requirements = reqs(&["Rust", "SQL"]);
        let a = assessment(vec![
            item(Some(1), "Rust", RequirementStatus::Met),
            item(Some(2), "SQL", RequirementStatus::Met),
        ]);
        assert_eq!(score_assessment(&a, &requirements), 100);
    }

    #[test]
    fn test_partial_counts_half() {
        let requirements = reqs(&["Rust", "SQL", "AWS", "Go"]);
        let a = assessment(vec![
            item(Some(1), "Rust", RequirementStatus::Met),
            item(Some(2), "SQL", RequirementStatus::Partial),
            item(Some(3), "AWS", RequirementStatus::Missing),
            item(Some(4), "Go", RequirementStatus::Partial),
        ]);
        // (1 + 0.5 + 0 + 0.5) / 4 = 0.5
        assert_eq!(score_assessment(&a, &requirements), 50);
    }

    #[test]
    fn test_skipped_requirement_counts_as_missing() {
        let requirements = reqs(&["Rust", "SQL", "AWS"]);
        let a = assessment(vec![item(None, "rust", RequirementStatus::Met)]);
        assert_eq!(score_assessment(&a, &requirements), 33);
        assert_eq!(a.status_for(&requirements, 2), RequirementStatus::Missing);
    }

    #[test]
    fn test_extra_model_items_are_ignored() {
        let requirements = reqs(&["Rust"]);
        let a = assessment(vec![
            item(Some(1), "Rust", RequirementStatus::Partial),
            item(Some(7), "Team player", RequirementStatus::Met),
        ]);
        assert_eq!(score_assessment(&a, &requirements), 50);
    }

    #[test]
    fn test_index_used_when_text_was_rephrased() {
        let requirements = reqs(&["5+ years Rust", "PostgreSQL"]);
        let a = assessment(vec![
            item(Some(1), "Five years of Rust", RequirementStatus::Met),
            item(Some(2), "Postgres", RequirementStatus::Missing),
        ]);
        assert_eq!(a.status_for(&requirements, 0), RequirementStatus::Met);
        assert_eq!(a.met_count(&requirements), 1);
    }

    #[test]
    fn test_aligned_to_follows_selection_order() {
        let a = assessment(vec![
            item(Some(2), "Structured  query language", RequirementStatus::Partial),
            item(Some(1), "rust", RequirementStatus::Met),
            item(Some(9), "Kubernetes", RequirementStatus::Met),
        ]);
        let aligned = a.aligned_to(&reqs(&["Rust", "SQL", "AWS"]));

        let texts: Vec<&str> = aligned.requirements.iter().map(|r| r.requirement.as_str()).collect();
        assert_eq!(texts, vec!["Rust", "SQL", "AWS"]);
        let indices: Vec<Option<usize>> = aligned.requirements.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(
            aligned.statuses(&reqs(&["Rust", "SQL", "AWS"])),
            vec![
                RequirementStatus::Met,
                RequirementStatus::Partial,
                RequirementStatus::Missing
            ]
        );
    }

    #[test]
    fn test_text_match_ignores_whitespace_runs() {
        let a = assessment(vec![item(None, "  distributed   systems ", RequirementStatus::Met)]);
        assert_eq!(a.status_for(&reqs(&["Distributed systems"]), 0), RequirementStatus::Met);
    }

    #[test]
    fn test_no_requirements_scores_zero() {
        assert_eq!(score_assessment(&assessment(vec![]), &[]), 0);
    }

    #[test]
    fn test_assessment_deserializes_model_output() {
        let a: CandidateAssessment = serde_json::from_value(json!({
            "candidate_name": null,
            "requirements": [
                {"index": 1, "requirement": "Rust", "status": "partial", "evidence": "Side projects"}
            ],
            "summary": "Promising."
        }))
        .unwrap();
        assert_eq!(a.requirements[0].status, RequirementStatus::Partial);
        assert!(a.candidate_name.is_none());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result: Result<CandidateAssessment, _> = serde_json::from_value(json!({
            "requirements": [{"requirement": "Rust", "status": "maybe"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_numbers_requirements() {
        let prompt = build_assessment_prompt("Backend role", &reqs(&["Rust", "SQL"]), "CV body").unwrap();
        assert!(prompt.contains("\"index\": 2"));
        assert!(prompt.contains("CV body"));
        assert!(!prompt.contains("{cv_text}"));
    }

    #[test]
    fn test_prompt_keeps_placeholders_inside_user_text_literal() {
        let prompt = build_assessment_prompt(
            "Backend role. Paste {cv_text} here.",
            &reqs(&["Rust"]),
            "SECRET-CV-BODY mentions {job_text}",
        )
        .unwrap();

        assert!(prompt.contains("Backend role. Paste {cv_text} here."));
        assert!(prompt.contains("SECRET-CV-BODY mentions {job_text}"));
        assert_eq!(prompt.matches("SECRET-CV-BODY").count(), 1);
    }

    #[tokio::test]
    async fn test_llm_scorer_retries_when_output_misses_requirements() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"content": "{\"requirements\": [], \"summary\": \"\"}"}}]
                }));
            })
            .await;

        let llm = LlmClient::new("key".to_string())
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry_base(Duration::from_millis(1));
        let scorer = LlmCandidateScorer::new(llm);

        let result = scorer.assess("job", &reqs(&["Rust"]), "cv").await;
        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(mock.hits_async().await, (MAX_ASSESSMENT_RETRIES + 1) as usize);
    }
}
