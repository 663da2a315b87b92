use std::cmp::Reverse;

use serde::Serialize;

use crate::reports::CandidateResult;

#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    /// 1-based; `None` for CVs that could not be scored.
    pub rank: Option<usize>,
    pub met_count: usize,
    #[serde(flatten)]
    pub result: CandidateResult,
}

/// Orders scored candidates by score, then number of fully met requirements, then
/// file name. Failed CVs follow unranked, in upload order.
pub fn rank_candidates(results: Vec<CandidateResult>, requirements: &[String]) -> Vec<RankedCandidate> {
    let (mut scored, mut failed): (Vec<_>, Vec<_>) = results
        .into_iter()
        .map(|result| {
            let met_count = result
                .assessment
                .as_ref()
                .map(|a| a.met_count(requirements))
                .unwrap_or(0);
            RankedCandidate {
                rank: None,
                met_count,
                result,
            }
        })
        .partition(|c| c.result.is_scored());

    scored.sort_by(|a, b| {
        let key = |c: &RankedCandidate| (Reverse(c.result.score), Reverse(c.met_count));
        key(a)
            .cmp(&key(b))
            .then_with(|| a.result.file_name.cmp(&b.result.file_name))
            .then_with(|| a.result.position.cmp(&b.result.position))
    });
    for (i, candidate) in scored.iter_mut().enumerate() {
        candidate.rank = Some(i + 1);
    }

    failed.sort_by_key(|c| c.result.position);
    scored.extend(failed);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::scorer::{CandidateAssessment, RequirementAssessment, RequirementStatus};

    fn requirements() -> Vec<String> {
        vec!["Rust".to_string(), "SQL".to_string()]
    }

    fn scored(position: usize, file: &str, statuses: [RequirementStatus; 2]) -> CandidateResult {
        let reqs = requirements();
        let assessment = CandidateAssessment {
            candidate_name: None,
            requirements: reqs
                .iter()
                .zip(statuses)
                .enumerate()
                .map(|(i, (r, status))| RequirementAssessment {
                    index: Some(i + 1),
                    requirement: r.clone(),
                    status,
                    evidence: String::new(),
                })
                .collect(),
            summary: String::new(),
        };
        let score = crate::screening::scorer::score_assessment(&assessment, &reqs);
        CandidateResult::scored(position, file.to_string(), assessment, score, false)
    }

    #[test]
    fn test_orders_by_score_then_met_then_name() {
        use RequirementStatus::*;
        let ranked = rank_candidates(
            vec![
                scored(0, "c.pdf", [Partial, Partial]), // 50, 0 met
                scored(1, "b.pdf", [Met, Missing]),     // 50, 1 met
                scored(2, "a.pdf", [Met, Met]),         // 100
                scored(3, "a2.pdf", [Met, Missing]),    // 50, 1 met
            ],
            &requirements(),
        );

        let order: Vec<&str> = ranked.iter().map(|c| c.result.file_name.as_str()).collect();
        assert_eq!(order, vec!["a.pdf", "a2.pdf", "b.pdf", "c.pdf"]);
        let ranks: Vec<Option<usize>> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_failed_candidates_trail_unranked_in_upload_order() {
        use RequirementStatus::*;
        let ranked = rank_candidates(
            vec![
                CandidateResult::failed(3, "z.pdf".to_string(), "no text"),
                scored(1, "m.pdf", [Missing, Missing]),
                CandidateResult::failed(0, "y.pdf".to_string(), "not a PDF"),
            ],
            &requirements(),
        );

        assert_eq!(ranked[0].result.file_name, "m.pdf");
        assert_eq!(ranked[0].rank, Some(1));
        assert_eq!(ranked[1].result.file_name, "y.pdf");
        assert_eq!(ranked[2].result.file_name, "z.pdf");
        assert!(ranked[1].rank.is_none() && ranked[2].rank.is_none());
    }

    #[test]
    fn test_flattened_serialization() {
        use RequirementStatus::*;
        let ranked = rank_candidates(vec![scored(0, "a.pdf", [Met, Met])], &requirements());
        let value = serde_json::to_value(&ranked[0]).unwrap();
        assert_eq!(value["rank"], 1);
        assert_eq!(value["file_name"], "a.pdf");
        assert_eq!(value["score"], 100);
        assert_eq!(value["met_count"], 2);
    }
}
