use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::LedgerError;

/// Adds `delta` to a wallet, creating the row at zero if absent. A pure
/// additive upsert; credits take no application-level lock.
pub async fn credit(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    user_id: i64,
    delta: i64,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"INSERT INTO wallets (tenant_id, user_id, balance) VALUES ($1, $2, $3)
           ON CONFLICT (tenant_id, user_id)
           DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = now()"#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(delta)
    .execute(tx.as_mut())
    .await?;
    Ok(())
}

/// Locks the wallet row and returns its balance, or `None` if no wallet
/// exists. The lock is held until the caller's transaction ends; every debit
/// must run its check-then-write sequence under this lock.
pub async fn lock_balance(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    user_id: i64,
) -> Result<Option<i64>, LedgerError> {
    let row = sqlx::query(
        "SELECT balance FROM wallets WHERE tenant_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_optional(tx.as_mut())
    .await?;
    row.map(|r| r.try_get::<i64, _>("balance").map_err(LedgerError::from))
        .transpose()
}

/// Debits a wallet the caller has already locked and balance-checked.
pub async fn debit_locked(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    user_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"UPDATE wallets SET balance = balance - $1, updated_at = now()
           WHERE tenant_id = $2 AND user_id = $3"#,
    )
    .bind(amount)
    .bind(tenant_id)
    .bind(user_id)
    .execute(tx.as_mut())
    .await?;
    Ok(())
}

/// Read-only balance lookup; a member without a wallet yet reads as zero.
pub async fn balance(pool: &PgPool, tenant_id: Uuid, user_id: i64) -> Result<i64, LedgerError> {
    let row = sqlx::query("SELECT balance FROM wallets WHERE tenant_id = $1 AND user_id = $2")
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(r) => r.try_get("balance")?,
        None => 0,
    })
}
