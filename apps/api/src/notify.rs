//! Completion emails through the Resend HTTP API.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::reports::AnalysisReport;

const RESEND_BASE_URL: &str = "https://api.resend.com";
/// Candidates listed in the email body.
const TOP_CANDIDATES: usize = 5;

#[derive(Clone)]
pub struct Notifier {
    http: Client,
    api_key: Option<String>,
    from: String,
    base_url: String,
}

impl Notifier {
    /// With no API key every send is a no-op.
    pub fn new(api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            api_key,
            from,
            base_url: RESEND_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Best effort: failures are logged and swallowed.
    pub async fn send_analysis_complete(&self, to: &str, report: &AnalysisReport) {
        let Some(api_key) = self.api_key.as_deref() else {
            return;
        };

        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": completion_subject(report),
            "text": completion_body(report),
        });

        let result = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!("Sent completion email for analysis {}", report.analysis.id);
            }
            Ok(resp) => warn!(
                "Completion email for analysis {} rejected with status {}",
                report.analysis.id,
                resp.status()
            ),
            Err(e) => warn!(
                "Completion email for analysis {} failed: {e}",
                report.analysis.id
            ),
        }
    }
}

fn completion_subject(report: &AnalysisReport) -> String {
    format!(
        "Your screening is ready: {} of {} CVs scored",
        report.analysis.scored_count, report.analysis.cv_count
    )
}

fn completion_body(report: &AnalysisReport) -> String {
    let mut lines = vec![format!(
        "Screening {} finished with status {}.",
        report.analysis.id, report.analysis.status
    )];

    let top: Vec<String> = report
        .candidates
        .iter()
        .filter_map(|c| {
            let rank = c.rank?;
            let name = c
                .result
                .candidate_name
                .as_deref()
                .unwrap_or(&c.result.file_name);
            Some(format!("{rank}. {name} ({}/100)", c.result.score.unwrap_or(0)))
        })
        .take(TOP_CANDIDATES)
        .collect();

    if !top.is_empty() {
        lines.push(String::new());
        lines.push("Top candidates:".to_string());
        lines.extend(top);
    }

    if report.analysis.failed_count > 0 {
        lines.push(String::new());
        lines.push(format!(
            "{} CV(s) could not be scored and their credits were refunded.",
            report.analysis.failed_count
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{AnalysisSummary, CandidateResult};
    use crate::screening::scorer::CandidateAssessment;
    use chrono::Utc;
    use httpmock::prelude::*;
    use uuid::Uuid;

    fn report() -> AnalysisReport {
        let summary = AnalysisSummary {
            id: Uuid::new_v4(),
            status: "completed".to_string(),
            job_text: "Backend engineer".to_string(),
            requirements: vec!["Rust".to_string()],
            cv_count: 2,
            scored_count: 1,
            failed_count: 1,
            cached_count: 0,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        let assessment = CandidateAssessment {
            candidate_name: Some("Jane Roe".to_string()),
            requirements: vec![],
            summary: String::new(),
        };
        AnalysisReport::new(
            summary,
            vec![
                CandidateResult::scored(0, "jane.pdf".to_string(), assessment, 80, false),
                CandidateResult::failed(1, "scan.pdf".to_string(), "no text"),
            ],
        )
    }

    #[test]
    fn test_body_lists_ranked_candidates_and_refunds() {
        let body = completion_body(&report());
        assert!(body.contains("1. Jane Roe (80/100)"));
        assert!(body.contains("1 CV(s) could not be scored"));
        assert!(!body.contains("scan.pdf"));
    }

    #[tokio::test]
    async fn test_sends_email_when_configured() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/emails")
                .header("authorization", "Bearer re_test")
                .body_contains("recruiter@example.com");
            then.status(200).json_body(serde_json::json!({"id": "email_1"}));
        });

        let notifier = Notifier::new(Some("re_test".to_string()), "Screener <noreply@example.com>".to_string())
            .unwrap()
            .with_base_url(server.base_url());
        notifier
            .send_analysis_complete("recruiter@example.com", &report())
            .await;

        mock.assert();
    }

    #[tokio::test]
    async fn test_disabled_notifier_makes_no_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/emails");
            then.status(200);
        });

        let notifier = Notifier::new(None, "x@example.com".to_string())
            .unwrap()
            .with_base_url(server.base_url());
        assert!(!notifier.is_enabled());
        notifier
            .send_analysis_complete("recruiter@example.com", &report())
            .await;

        mock.assert_hits(0);
    }
}
