use serde_json::json;
use sqlx::{PgPool, Row};

use crate::audit;
use crate::auth::AuthContext;
use crate::error::LedgerError;
use crate::wallets;

pub const WITHDRAWAL_STATUS_PENDING: &str = "pending";
pub const WITHDRAWAL_STATUS_APPROVED: &str = "approved";

/// The outcome of requesting a withdrawal.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestedWithdrawal {
    pub id: i64,
    pub status: String,
    /// True when an idempotency-key replay returned the original request.
    pub idempotent: bool,
}

/// Requests a withdrawal against the caller's wallet.
///
/// The wallet is locked and balance-checked at request time, so a withdrawal
/// cannot be requested against unavailable funds. No debit happens until an
/// administrator approves it.
pub async fn request(
    pool: &PgPool,
    ctx: &AuthContext,
    amount: i64,
    idempotency_key: Option<&str>,
) -> Result<RequestedWithdrawal, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::Validation("amount must be positive".into()));
    }

    let mut tx = pool.begin().await?;

    if let Some(key) = idempotency_key {
        let existing = sqlx::query(
            "SELECT id, status FROM withdrawal_requests WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(ctx.tenant_id)
        .bind(key)
        .fetch_optional(tx.as_mut())
        .await?;
        if let Some(row) = existing {
            return Ok(RequestedWithdrawal {
                id: row.try_get("id")?,
                status: row.try_get("status")?,
                idempotent: true,
            });
        }
    }

    let balance = wallets::lock_balance(&mut tx, ctx.tenant_id, ctx.user_id)
        .await?
        .ok_or(LedgerError::NotFound("wallet"))?;
    if balance < amount {
        return Err(LedgerError::InsufficientBalance);
    }

    let inserted = sqlx::query(
        r#"INSERT INTO withdrawal_requests (tenant_id, user_id, amount, idempotency_key, status)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id, status"#,
    )
    .bind(ctx.tenant_id)
    .bind(ctx.user_id)
    .bind(amount)
    .bind(idempotency_key)
    .bind(WITHDRAWAL_STATUS_PENDING)
    .fetch_one(tx.as_mut())
    .await;

    let row = match inserted {
        Ok(row) => row,
        Err(e) => {
            // NOTE: 23505 = unique_violation. A concurrent retry with the
            // same key won the insert; answer with the original request.
            if let (Some(key), sqlx::Error::Database(db_err)) = (idempotency_key, &e) {
                if db_err.code().as_deref() == Some("23505") {
                    drop(tx);
                    let row = sqlx::query(
                        "SELECT id, status FROM withdrawal_requests WHERE tenant_id = $1 AND idempotency_key = $2",
                    )
                    .bind(ctx.tenant_id)
                    .bind(key)
                    .fetch_one(pool)
                    .await?;
                    return Ok(RequestedWithdrawal {
                        id: row.try_get("id")?,
                        status: row.try_get("status")?,
                        idempotent: true,
                    });
                }
            }
            return Err(e.into());
        }
    };

    tx.commit().await?;
    Ok(RequestedWithdrawal {
        id: row.try_get("id")?,
        status: row.try_get("status")?,
        idempotent: false,
    })
}

/// Approves a pending withdrawal and debits the wallet.
///
/// Locks the withdrawal row first, then the wallet; the balance is re-checked
/// at approval time since it may have changed since the request.
pub async fn approve(pool: &PgPool, ctx: &AuthContext, withdrawal_id: i64) -> Result<(), LedgerError> {
    ctx.require_admin()?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT user_id, amount, status FROM withdrawal_requests
           WHERE id = $1 AND tenant_id = $2 FOR UPDATE"#,
    )
    .bind(withdrawal_id)
    .bind(ctx.tenant_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(LedgerError::NotFound("withdrawal"))?;

    let status: String = row.try_get("status")?;
    if status != WITHDRAWAL_STATUS_PENDING {
        return Err(LedgerError::InvalidState(format!(
            "withdrawal is {status}, not pending"
        )));
    }
    let user_id: i64 = row.try_get("user_id")?;
    let amount: i64 = row.try_get("amount")?;

    let balance = wallets::lock_balance(&mut tx, ctx.tenant_id, user_id)
        .await?
        .ok_or(LedgerError::InsufficientBalance)?;
    if balance < amount {
        return Err(LedgerError::InsufficientBalance);
    }

    wallets::debit_locked(&mut tx, ctx.tenant_id, user_id, amount).await?;

    sqlx::query("UPDATE withdrawal_requests SET status = $1 WHERE id = $2")
        .bind(WITHDRAWAL_STATUS_APPROVED)
        .bind(withdrawal_id)
        .execute(tx.as_mut())
        .await?;

    audit::record(
        &mut tx,
        ctx.tenant_id,
        ctx.user_id,
        audit::ACTION_WITHDRAWAL_APPROVED,
        "withdrawal",
        &withdrawal_id.to_string(),
        json!({ "amount": amount }),
    )
    .await?;

    tx.commit().await?;
    Ok(())
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

    #[test]
    fn request_rejects_non_positive_amounts_before_any_query() {
        let ctx = AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 3,
            role: Role::Member,
        };
        tokio_test::block_on(async {
            let err = request(&lazy_pool(), &ctx, 0, None).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        });
    }

    #[test]
    fn approve_is_admin_only() {
        let ctx = AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 3,
            role: Role::Member,
        };
        tokio_test::block_on(async {
            let err = approve(&lazy_pool(), &ctx, 1).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden));
        });
    }
}
