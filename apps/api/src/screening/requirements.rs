//! Requirements: proposes screenable requirements from a job description and
//! validates the recruiter's selection of must-haves.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, JSON_ONLY_SYSTEM};
use crate::llm_client::LlmClient;
use crate::screening::prompts::{REQUIREMENTS_PROMPT_TEMPLATE, REQUIREMENTS_SYSTEM};

/// Upper bound on requirements scored in one analysis.
pub const MAX_SELECTED_REQUIREMENTS: usize = 10;
/// Upper bound on proposals returned to the client.
pub const MAX_PROPOSED_REQUIREMENTS: usize = 20;
const MAX_REQUIREMENT_CHARS: usize = 300;

/// A requirement proposed by the model for the recruiter to pick from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedRequirement {
    pub text: String,
    #[serde(default)]
    pub must_have: bool,
}

#[derive(Debug, Deserialize)]
struct RequirementsEnvelope {
    #[serde(default)]
    requirements: Vec<ProposedRequirement>,
}

/// Asks the model for the requirements stated in a job description.
pub async fn extract_requirements(
    job_text: &str,
    llm: &LlmClient,
) -> Result<Vec<ProposedRequirement>, AppError> {
    if job_text.trim().is_empty() {
        return Err(AppError::Validation("job_text cannot be empty".to_string()));
    }

    let prompt = fill_template(
        REQUIREMENTS_PROMPT_TEMPLATE,
        &[("json_only", JSON_ONLY_SYSTEM), ("job_text", job_text.trim())],
    );

    let envelope: RequirementsEnvelope = llm
        .call_json(&prompt, REQUIREMENTS_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Requirement extraction failed: {e}")))?;

    Ok(tidy_proposals(envelope.requirements))
}

/// Drops blanks and case-insensitive duplicates, lists must-haves first and caps the list.
fn tidy_proposals(proposals: Vec<ProposedRequirement>) -> Vec<ProposedRequirement> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ProposedRequirement> = proposals
        .into_iter()
        .filter_map(|p| {
            let text = p.text.trim().to_string();
            if text.is_empty() || !seen.insert(text.to_lowercase()) {
                return None;
            }
            Some(ProposedRequirement {
                text,
                must_have: p.must_have,
            })
        })
        .collect();

    // stable: keeps the model's priority order within each group
    unique.sort_by_key(|p| !p.must_have);
    unique.truncate(MAX_PROPOSED_REQUIREMENTS);
    unique
}

/// Validates the requirements a recruiter selected for scoring.
///
/// Trims, drops blanks and case-insensitive duplicates (first spelling wins).
/// Between 1 and `MAX_SELECTED_REQUIREMENTS` must remain.
pub fn normalize_selection(requirements: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for requirement in requirements {
        let text = requirement.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > MAX_REQUIREMENT_CHARS {
            return Err(AppError::Validation(format!(
                "Requirement exceeds {MAX_REQUIREMENT_CHARS} characters: {}...",
                text.chars().take(40).collect::<String>()
            )));
        }
        if seen.insert(text.to_lowercase()) {
            selected.push(text);
        }
    }

    if selected.is_empty() {
        return Err(AppError::Validation(
            "Select at least one requirement to screen against".to_string(),
        ));
    }
    if selected.len() > MAX_SELECTED_REQUIREMENTS {
        return Err(AppError::Validation(format!(
            "At most {MAX_SELECTED_REQUIREMENTS} requirements can be selected, got {}",
            selected.len()
        )));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(text: &str, must_have: bool) -> ProposedRequirement {
        ProposedRequirement {
            text: text.to_string(),
            must_have,
        }
    }

    #[test]
    fn test_tidy_puts_must_haves_first_and_dedups() {
        let tidied = tidy_proposals(vec![
            proposal("Kubernetes", false),
            proposal("  Rust  ", true),
            proposal("rust", false),
            proposal("", true),
            proposal("SQL", true),
        ]);
        assert_eq!(
            tidied,
            vec![
                proposal("Rust", true),
                proposal("SQL", true),
                proposal("Kubernetes", false)
            ]
        );
    }

    #[test]
    fn test_tidy_caps_the_list() {
        let many = (0..30).map(|i| proposal(&format!("skill {i}"), true)).collect();
        assert_eq!(tidy_proposals(many).len(), MAX_PROPOSED_REQUIREMENTS);
    }

    #[test]
    fn test_envelope_tolerates_missing_must_have() {
        let env: RequirementsEnvelope =
            serde_json::from_str(r#"{"requirements": [{"text": "Go"}]}"#).unwrap();
        assert!(!env.requirements[0].must_have);
    }

    #[test]
    fn test_selection_collapses_whitespace_and_dedups() {
        let selected = normalize_selection(vec![
            " 5+ years   Python ".to_string(),
            "5+ YEARS python".to_string(),
            "   ".to_string(),
            "AWS".to_string(),
        ])
        .unwrap();
        assert_eq!(selected, vec!["5+ years Python", "AWS"]);
    }

    #[test]
    fn test_selection_requires_one() {
        assert!(matches!(
            normalize_selection(vec![" ".to_string()]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_selection_rejects_too_many() {
        let too_many = (0..=MAX_SELECTED_REQUIREMENTS)
            .map(|i| format!("requirement {i}"))
            .collect();
        assert!(normalize_selection(too_many).is_err());
    }

    #[test]
    fn test_selection_rejects_overlong_requirement() {
        assert!(normalize_selection(vec!["x".repeat(MAX_REQUIREMENT_CHARS + 1)]).is_err());
    }
}
