use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::LedgerError;

pub const ACTION_COMMISSION_APPROVED: &str = "commission_approved";
pub const ACTION_COMMISSION_REVERSED: &str = "commission_reversed";
pub const ACTION_WITHDRAWAL_APPROVED: &str = "withdrawal_approved";

/// Appends one audit row inside the caller's transaction, so the audit entry
/// commits if and only if the transition it records does. Append-only; core
/// logic never reads it back.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    actor: i64,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    metadata: serde_json::Value,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"INSERT INTO audit_logs (tenant_id, actor, action, entity_type, entity_id, metadata)
           VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(tenant_id)
    .bind(actor.to_string())
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(metadata)
    .execute(tx.as_mut())
    .await?;
    Ok(())
}
