use serde_json::json;
use sqlx::{PgPool, Row};

use crate::audit;
use crate::auth::AuthContext;
use crate::error::LedgerError;
use crate::orders::{
    COMMISSION_STATUS_APPROVED, COMMISSION_STATUS_PENDING, COMMISSION_STATUS_REVERSED,
};
use crate::types::{Commission, EarningsRow};
use crate::wallets;

/// Approves a pending commission.
///
/// The wallet was already credited when the order was placed, so approval is
/// a status-only transition recording administrative sign-off.
pub async fn approve(pool: &PgPool, ctx: &AuthContext, commission_id: i64) -> Result<(), LedgerError> {
    ctx.require_admin()?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT amount, status FROM commissions
           WHERE id = $1 AND tenant_id = $2 FOR UPDATE"#,
    )
    .bind(commission_id)
    .bind(ctx.tenant_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(LedgerError::NotFound("commission"))?;

    let status: String = row.try_get("status")?;
    if status != COMMISSION_STATUS_PENDING {
        return Err(LedgerError::InvalidState(format!(
            "commission is {status}, not pending"
        )));
    }
    let amount: i64 = row.try_get("amount")?;

    sqlx::query("UPDATE commissions SET status = $1 WHERE id = $2")
        .bind(COMMISSION_STATUS_APPROVED)
        .bind(commission_id)
        .execute(tx.as_mut())
        .await?;

    audit::record(
        &mut tx,
        ctx.tenant_id,
        ctx.user_id,
        audit::ACTION_COMMISSION_APPROVED,
        "commission",
        &commission_id.to_string(),
        json!({ "amount": amount }),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Reverses a pending or approved commission.
///
/// An approved commission was credited at order time, so reversing it debits
/// the recipient's wallet under a row lock; the debit fails with
/// `InsufficientBalance` if the recipient already withdrew the funds. A
/// pending reversal touches no wallet.
pub async fn reverse(pool: &PgPool, ctx: &AuthContext, commission_id: i64) -> Result<(), LedgerError> {
    ctx.require_admin()?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT recipient_user_id, amount, status FROM commissions
           WHERE id = $1 AND tenant_id = $2 FOR UPDATE"#,
    )
    .bind(commission_id)
    .bind(ctx.tenant_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(LedgerError::NotFound("commission"))?;

    let status: String = row.try_get("status")?;
    let amount: i64 = row.try_get("amount")?;
    let recipient: i64 = row.try_get("recipient_user_id")?;

    if status != COMMISSION_STATUS_PENDING && status != COMMISSION_STATUS_APPROVED {
        return Err(LedgerError::InvalidState(format!(
            "commission is {status}, not reversible"
        )));
    }

    if status == COMMISSION_STATUS_APPROVED {
        let balance = wallets::lock_balance(&mut tx, ctx.tenant_id, recipient)
            .await?
            .ok_or(LedgerError::InsufficientBalance)?;
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        wallets::debit_locked(&mut tx, ctx.tenant_id, recipient, amount).await?;
    }

    sqlx::query("UPDATE commissions SET status = $1 WHERE id = $2")
        .bind(COMMISSION_STATUS_REVERSED)
        .bind(commission_id)
        .execute(tx.as_mut())
        .await?;

    audit::record(
        &mut tx,
        ctx.tenant_id,
        ctx.user_id,
        audit::ACTION_COMMISSION_REVERSED,
        "commission",
        &commission_id.to_string(),
        json!({ "amount": amount, "previous_status": status }),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Lists the tenant's commissions, newest first, optionally by status.
pub async fn list(
    pool: &PgPool,
    ctx: &AuthContext,
    status: Option<&str>,
) -> Result<Vec<Commission>, LedgerError> {
    ctx.require_admin()?;

    if let Some(s) = status {
        if !matches!(
            s,
            COMMISSION_STATUS_PENDING | COMMISSION_STATUS_APPROVED | COMMISSION_STATUS_REVERSED
        ) {
            return Err(LedgerError::Validation(format!(
                "unknown commission status: {s}"
            )));
        }
    }

    let rows = sqlx::query_as::<_, Commission>(
        r#"SELECT id, order_id, recipient_user_id, amount, level, status, created_at
           FROM commissions
           WHERE tenant_id = $1 AND ($2::text IS NULL OR status = $2)
           ORDER BY created_at DESC"#,
    )
    .bind(ctx.tenant_id)
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Per-member totals of approved commissions, highest earners first.
pub async fn earnings_report(pool: &PgPool, ctx: &AuthContext) -> Result<Vec<EarningsRow>, LedgerError> {
    ctx.require_admin()?;

    let rows = sqlx::query_as::<_, EarningsRow>(
        r#"SELECT m.id AS user_id, m.email, COALESCE(SUM(c.amount), 0)::bigint AS total_earned
           FROM members m
           LEFT JOIN commissions c
             ON c.recipient_user_id = m.id AND c.tenant_id = m.tenant_id AND c.status = $2
           WHERE m.tenant_id = $1
           GROUP BY m.id, m.email
           ORDER BY total_earned DESC"#,
    )
    .bind(ctx.tenant_id)
    .bind(COMMISSION_STATUS_APPROVED)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unreachable")
            .unwrap()
    }

    fn member_ctx() -> AuthContext {
        AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 9,
            role: Role::Member,
        }
    }

    #[test]
    fn admin_ops_refuse_non_admin_callers_before_any_query() {
        let ctx = member_ctx();
        tokio_test::block_on(async {
            let pool = lazy_pool();

            let err = approve(&pool, &ctx, 1).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden));
            let err = reverse(&pool, &ctx, 1).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden));
            let err = list(&pool, &ctx, None).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden));
            let err = earnings_report(&pool, &ctx).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden));
        });
    }

    #[test]
    fn list_rejects_unknown_status_values() {
        let ctx = AuthContext {
            role: Role::Admin,
            ..member_ctx()
        };
        tokio_test::block_on(async {
            let pool = lazy_pool();
            let err = list(&pool, &ctx, Some("settled")).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        });
    }
}
