use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub analysis_id: Option<Uuid>,
    pub kind: String,
    pub subscription_delta: i32,
    pub purchased_delta: i32,
    pub created_at: DateTime<Utc>,
}
