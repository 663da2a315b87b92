use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_text: String,
    pub requirements: Vec<String>,
    pub status: String,
    pub cv_count: i32,
    pub scored_count: i32,
    pub failed_count: i32,
    pub cached_count: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateResultRow {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub position: i32,
    pub file_name: String,
    pub s3_key: Option<String>,
    pub status: String,
    pub score: Option<i16>,
    pub cached: bool,
    pub assessment: Option<Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
