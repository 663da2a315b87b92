//! Axum route handlers for the credits API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthUser, ServiceKey};
use crate::credits::ledger::{self, CreditBalance, GrantKind};
use crate::errors::AppError;
use crate::models::credits::CreditTransactionRow;
use crate::state::AppState;

const RECENT_TRANSACTIONS: i64 = 20;

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub balance: CreditBalance,
    pub total: i32,
    pub transactions: Vec<CreditTransactionRow>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: Uuid,
    pub kind: GrantKind,
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub user_id: Uuid,
    pub balance: CreditBalance,
    pub total: i32,
}

/// GET /api/v1/credits
pub async fn handle_get_credits(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CreditsResponse>, AppError> {
    let balance = ledger::balance(&state.db, user.id).await?;
    let transactions = ledger::recent_transactions(&state.db, user.id, RECENT_TRANSACTIONS).await?;

    Ok(Json(CreditsResponse {
        total: balance.total(),
        balance,
        transactions,
    }))
}

/// POST /api/v1/credits/grant
///
/// Called by the billing integration after a renewal or purchase.
pub async fn handle_grant_credits(
    State(state): State<AppState>,
    _service: ServiceKey,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, AppError> {
    let balance = ledger::grant(&state.db, request.user_id, request.kind, request.amount).await?;

    Ok(Json(GrantResponse {
        user_id: request.user_id,
        total: balance.total(),
        balance,
    }))
}
