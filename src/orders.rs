use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::LedgerError;
use crate::rules::{RuleSet, commission_plan};
use crate::upline::resolve_upline;
use crate::wallets;

pub const COMMISSION_STATUS_PENDING: &str = "pending";
pub const COMMISSION_STATUS_APPROVED: &str = "approved";
pub const COMMISSION_STATUS_REVERSED: &str = "reversed";

/// The outcome of placing an order.
#[derive(Debug, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    /// True when an idempotency-key replay returned the original order.
    pub idempotent: bool,
}

/// Places an order and distributes upline commissions, as one atomic unit.
///
/// Inside a single transaction: replay the idempotency key if one matches,
/// otherwise insert the order, walk the upline, and for every ancestor whose
/// level has a positive rule insert a `pending` commission paired with an
/// upsert-credit of the recipient's wallet. Any failure rolls the whole thing
/// back; there is no partial commission set and no partial credit.
pub async fn place_order(
    pool: &PgPool,
    ctx: &AuthContext,
    total_amount: i64,
    idempotency_key: Option<&str>,
    upline_max_depth: u32,
) -> Result<PlacedOrder, LedgerError> {
    if total_amount <= 0 {
        return Err(LedgerError::Validation(
            "total_amount must be positive".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    if let Some(key) = idempotency_key {
        let existing =
            sqlx::query("SELECT id FROM orders WHERE tenant_id = $1 AND idempotency_key = $2")
                .bind(ctx.tenant_id)
                .bind(key)
                .fetch_optional(tx.as_mut())
                .await?;
        if let Some(row) = existing {
            // replay: nothing was written, dropping the tx rolls it back
            return Ok(PlacedOrder {
                order_id: row.try_get("id")?,
                idempotent: true,
            });
        }
    }

    let rules = RuleSet::load(&mut tx, ctx.tenant_id).await?;

    let member = sqlx::query("SELECT id FROM members WHERE id = $1 AND tenant_id = $2")
        .bind(ctx.user_id)
        .bind(ctx.tenant_id)
        .fetch_optional(tx.as_mut())
        .await?;
    if member.is_none() {
        return Err(LedgerError::NotFound("member"));
    }

    let order_id = Uuid::new_v4();
    let inserted = sqlx::query(
        r#"INSERT INTO orders (id, tenant_id, user_id, total_amount, idempotency_key)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(order_id)
    .bind(ctx.tenant_id)
    .bind(ctx.user_id)
    .bind(total_amount)
    .bind(idempotency_key)
    .execute(tx.as_mut())
    .await;

    if let Err(e) = inserted {
        // NOTE: 23505 = unique_violation. A concurrent retry carrying the same
        // key won the insert; treat this call as the replay it is.
        if let (Some(key), sqlx::Error::Database(db_err)) = (idempotency_key, &e) {
            if db_err.code().as_deref() == Some("23505") {
                drop(tx);
                let row = sqlx::query(
                    "SELECT id FROM orders WHERE tenant_id = $1 AND idempotency_key = $2",
                )
                .bind(ctx.tenant_id)
                .bind(key)
                .fetch_one(pool)
                .await?;
                return Ok(PlacedOrder {
                    order_id: row.try_get("id")?,
                    idempotent: true,
                });
            }
        }
        return Err(e.into());
    }

    let upline = resolve_upline(&mut tx, ctx.tenant_id, ctx.user_id, upline_max_depth).await?;

    for credit in commission_plan(total_amount, &rules, &upline) {
        sqlx::query(
            r#"INSERT INTO commissions (tenant_id, order_id, recipient_user_id, amount, level, status)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(ctx.tenant_id)
        .bind(order_id)
        .bind(credit.recipient_user_id)
        .bind(credit.amount)
        .bind(credit.level)
        .bind(COMMISSION_STATUS_PENDING)
        .execute(tx.as_mut())
        .await?;

        wallets::credit(&mut tx, ctx.tenant_id, credit.recipient_user_id, credit.amount).await?;
    }

    tx.commit().await?;
    Ok(PlacedOrder {
        order_id,
        idempotent: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn rejects_non_positive_totals_before_touching_the_store() {
        let ctx = AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 1,
            role: Role::Member,
        };
        tokio_test::block_on(async {
            // a lazy pool: connecting would fail, so an early error proves
            // validation happens before any transaction is opened
            let pool = sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost/unreachable")
                .unwrap();

            let err = place_order(&pool, &ctx, 0, None, 10).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));

            let err = place_order(&pool, &ctx, -5, None, 10).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        });
    }
}
