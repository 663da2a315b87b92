use anyhow::{Context, Result};

use crate::reports::{AnalysisSummary, RankedCandidate};

/// Renders the ranked report as CSV, one row per CV.
///
/// Columns: rank, candidate, file_name, score, one column per selected
/// requirement (`met` / `partial` / `missing`), summary, status. Failed rows
/// leave requirement cells empty and carry the failure reason as summary.
pub fn export_csv(analysis: &AnalysisSummary, candidates: &[RankedCandidate]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["rank", "candidate", "file_name", "score"];
    header.extend(analysis.requirements.iter().map(String::as_str));
    header.extend(["summary", "status"]);
    writer.write_record(&header)?;

    for candidate in candidates {
        let result = &candidate.result;
        let mut record = vec![
            candidate.rank.map(|r| r.to_string()).unwrap_or_default(),
            result.candidate_name.clone().unwrap_or_default(),
            result.file_name.clone(),
            result.score.map(|s| s.to_string()).unwrap_or_default(),
        ];

        match &result.assessment {
            Some(assessment) => {
                record.extend(
                    assessment
                        .statuses(&analysis.requirements)
                        .into_iter()
                        .map(|s| s.as_str().to_string()),
                );
                record.push(assessment.summary.clone());
                record.push("scored".to_string());
            }
            None => {
                record.extend(analysis.requirements.iter().map(|_| String::new()));
                record.push(result.failure_reason.clone().unwrap_or_default());
                record.push("failed".to_string());
            }
        }

        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {e}"))
        .context("CSV export failed")
}

/// Attachment file name for an analysis export.
pub fn export_file_name(analysis: &AnalysisSummary) -> String {
    format!(
        "screening-{}-{}.csv",
        analysis.created_at.format("%Y%m%d"),
        &analysis.id.simple().to_string()[..8]
    )
}
