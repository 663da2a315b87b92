//! Credit ledger: one credit pays for one CV analysis.
//!
//! Every account carries two sub-balances: the monthly subscription allotment
//! and credits bought outright. Debits drain the subscription balance first,
//! since it does not roll over; refunds undo a debit in reverse order.
//!
//! Every balance change is written together with a `credit_transactions` row in
//! the same database transaction.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::credits::CreditTransactionRow;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits: {required} required, {available} available")]
    Insufficient { required: i32, available: i32 },

    #[error("invalid credit amount {0}: must be positive and fit the balance")]
    InvalidAmount(i32),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub subscription: i32,
    pub purchased: i32,
}

impl CreditBalance {
    pub fn total(&self) -> i32 {
        self.subscription.saturating_add(self.purchased)
    }
}

/// Credits attributed to each sub-balance. Negative values are debits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSplit {
    pub subscription: i32,
    pub purchased: i32,
}

impl CreditSplit {
    pub fn total(&self) -> i32 {
        self.subscription + self.purchased
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Subscription renewal: resets the subscription balance to the plan allotment.
    Subscription,
    /// One-off purchase: adds to the purchased balance.
    Purchase,
}

impl GrantKind {
    fn transaction_kind(self) -> &'static str {
        match self {
            GrantKind::Subscription => "grant_subscription",
            GrantKind::Purchase => "grant_purchase",
        }
    }
}

/// Credits held for an in-flight analysis.
#[derive(Debug, Clone)]
pub struct CreditReservation {
    pub user_id: Uuid,
    pub analysis_id: Uuid,
    /// Positive amounts taken from each sub-balance.
    pub debited: CreditSplit,
}

// ────────────────────────────────────────────────────────────────────────────
// Pure planning
// ────────────────────────────────────────────────────────────────────────────

/// Splits a debit across the sub-balances, subscription first.
pub fn plan_debit(balance: CreditBalance, amount: i32) -> Result<CreditSplit, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if balance.total() < amount {
        return Err(LedgerError::Insufficient {
            required: amount,
            available: balance.total(),
        });
    }
    let subscription = amount.min(balance.subscription);
    Ok(CreditSplit {
        subscription,
        purchased: amount - subscription,
    })
}

/// Returns `count` credits of a debit: purchased credits first, never more than was taken.
pub fn plan_refund(debited: CreditSplit, count: i32) -> CreditSplit {
    let count = count.clamp(0, debited.total());
    let purchased = count.min(debited.purchased);
    CreditSplit {
        subscription: count - purchased,
        purchased,
    }
}

/// Where a refund lands when the subscription was renewed after the reservation.
///
/// A renewal resets the subscription balance, so subscription credits handed
/// back afterwards would top up the fresh allotment. They are returned as
/// purchased credits instead.
pub fn route_refund(refund: CreditSplit, renewed_since_reserve: bool) -> CreditSplit {
    if !renewed_since_reserve {
        return refund;
    }
    CreditSplit {
        subscription: 0,
        purchased: refund.total(),
    }
}

/// New balance and the delta a grant produces.
pub fn plan_grant(
    balance: CreditBalance,
    kind: GrantKind,
    amount: i32,
) -> Result<(CreditBalance, CreditSplit), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    match kind {
        GrantKind::Subscription => Ok((
            CreditBalance {
                subscription: amount,
                purchased: balance.purchased,
            },
            CreditSplit {
                subscription: amount - balance.subscription,
                purchased: 0,
            },
        )),
        GrantKind::Purchase => {
            let purchased = balance
                .purchased
                .checked_add(amount)
                .ok_or(LedgerError::InvalidAmount(amount))?;
            Ok((
                CreditBalance {
                    subscription: balance.subscription,
                    purchased,
                },
                CreditSplit {
                    subscription: 0,
                    purchased: amount,
                },
            ))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Database operations
// ────────────────────────────────────────────────────────────────────────────

/// Reserves `amount` credits for an analysis. The account row is locked for the
/// duration of the transaction so concurrent reservations cannot overdraw it.
pub async fn reserve(
    pool: &PgPool,
    user_id: Uuid,
    analysis_id: Uuid,
    amount: i32,
) -> Result<CreditReservation, LedgerError> {
    let mut tx = pool.begin().await?;

    let balance = lock_balance(&mut tx, user_id).await?.unwrap_or_default();
    let debited = plan_debit(balance, amount)?;

    apply_delta(
        &mut tx,
        user_id,
        Some(analysis_id),
        "reserve",
        CreditSplit {
            subscription: -debited.subscription,
            purchased: -debited.purchased,
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        "Reserved {} credits for analysis {analysis_id} (user {user_id}, subscription={}, purchased={})",
        amount, debited.subscription, debited.purchased
    );

    Ok(CreditReservation {
        user_id,
        analysis_id,
        debited,
    })
}

/// Refunds `count` credits of a reservation inside the caller's transaction.
pub async fn refund(
    conn: &mut PgConnection,
    reservation: &CreditReservation,
    count: i32,
) -> Result<CreditSplit, LedgerError> {
    let planned = plan_refund(reservation.debited, count);
    if planned.total() == 0 {
        return Ok(planned);
    }

    lock_balance(conn, reservation.user_id).await?;
    let renewed = renewed_since_reserve(conn, reservation).await?;
    let refunded = route_refund(planned, renewed);
    apply_delta(
        conn,
        reservation.user_id,
        Some(reservation.analysis_id),
        "refund",
        refunded,
    )
    .await?;

    info!(
        "Refunded {} credits for analysis {} (user {})",
        refunded.total(),
        reservation.analysis_id,
        reservation.user_id
    );
    Ok(refunded)
}

/// Credits an account after a subscription renewal or purchase.
pub async fn grant(
    pool: &PgPool,
    user_id: Uuid,
    kind: GrantKind,
    amount: i32,
) -> Result<CreditBalance, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO credit_accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let balance = lock_balance(&mut tx, user_id).await?.unwrap_or_default();
    let (updated, delta) = plan_grant(balance, kind, amount)?;
    apply_delta(&mut tx, user_id, None, kind.transaction_kind(), delta).await?;

    tx.commit().await?;

    info!("Granted {amount} {kind:?} credits to user {user_id}");
    Ok(updated)
}

pub async fn balance(pool: &PgPool, user_id: Uuid) -> Result<CreditBalance, LedgerError> {
    let row: Option<(i32, i32)> = sqlx::query_as(
        "SELECT subscription_credits, purchased_credits FROM credit_accounts WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(subscription, purchased)| CreditBalance {
            subscription,
            purchased,
        })
        .unwrap_or_default())
}

pub async fn recent_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<CreditTransactionRow>, LedgerError> {
    Ok(sqlx::query_as::<_, CreditTransactionRow>(
        "SELECT * FROM credit_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

async fn lock_balance(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<CreditBalance>, LedgerError> {
    let row: Option<(i32, i32)> = sqlx::query_as(
        "SELECT subscription_credits, purchased_credits FROM credit_accounts WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(subscription, purchased)| CreditBalance {
        subscription,
        purchased,
    }))
}

/// True when a subscription grant was recorded after this reservation's debit.
async fn renewed_since_reserve(
    conn: &mut PgConnection,
    reservation: &CreditReservation,
) -> Result<bool, LedgerError> {
    let renewed: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM credit_transactions g
            WHERE g.user_id = $1
              AND g.kind = 'grant_subscription'
              AND g.created_at > (
                  SELECT min(r.created_at) FROM credit_transactions r
                  WHERE r.user_id = $1 AND r.analysis_id = $2 AND r.kind = 'reserve'
              )
        )
        "#,
    )
    .bind(reservation.user_id)
    .bind(reservation.analysis_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(renewed)
}

async fn apply_delta(
    conn: &mut PgConnection,
    user_id: Uuid,
    analysis_id: Option<Uuid>,
    kind: &str,
    delta: CreditSplit,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE credit_accounts
        SET subscription_credits = subscription_credits + $2,
            purchased_credits = purchased_credits + $3,
            updated_at = now()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(delta.subscription)
    .bind(delta.purchased)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO credit_transactions
            (id, user_id, analysis_id, kind, subscription_delta, purchased_delta)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(analysis_id)
    .bind(kind)
    .bind(delta.subscription)
    .bind(delta.purchased)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
