use sqlx::PgPool;

use crate::auth::AuthContext;
use crate::error::LedgerError;
use crate::types::MemberRecord;

pub const ROLE_MEMBER: &str = "member";
pub const ROLE_ADMIN: &str = "admin";

/// Creates a member in the caller's tenant. A sponsor, when given, must be an
/// existing member of the same tenant. Credentials live with the external
/// auth collaborator; none are stored here.
pub async fn create(
    pool: &PgPool,
    ctx: &AuthContext,
    email: &str,
    role: &str,
    sponsor_id: Option<i64>,
) -> Result<MemberRecord, LedgerError> {
    if email.trim().is_empty() {
        return Err(LedgerError::Validation("email is required".into()));
    }
    if role != ROLE_MEMBER && role != ROLE_ADMIN {
        return Err(LedgerError::Validation(format!("unknown role: {role}")));
    }

    if let Some(sid) = sponsor_id {
        let sponsor = sqlx::query("SELECT id FROM members WHERE id = $1 AND tenant_id = $2")
            .bind(sid)
            .bind(ctx.tenant_id)
            .fetch_optional(pool)
            .await?;
        if sponsor.is_none() {
            return Err(LedgerError::Validation("invalid sponsor_id".into()));
        }
    }

    let res = sqlx::query_as::<_, MemberRecord>(
        r#"INSERT INTO members (tenant_id, email, role, sponsor_id)
           VALUES ($1, $2, $3, $4)
           RETURNING id, email, role, sponsor_id, status, created_at"#,
    )
    .bind(ctx.tenant_id)
    .bind(email)
    .bind(role)
    .bind(sponsor_id)
    .fetch_one(pool)
    .await;

    match res {
        Ok(member) => Ok(member),
        Err(e) => {
            // NOTE: 23505 = unique_violation
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23505") {
                    return Err(LedgerError::Conflict("email already exists".into()));
                }
            }
            Err(e.into())
        }
    }
}

/// The direct sponsees of a member.
pub async fn downline(
    pool: &PgPool,
    ctx: &AuthContext,
    user_id: i64,
) -> Result<Vec<MemberRecord>, LedgerError> {
    let rows = sqlx::query_as::<_, MemberRecord>(
        r#"SELECT id, email, role, sponsor_id, status, created_at
           FROM members WHERE sponsor_id = $1 AND tenant_id = $2
           ORDER BY created_at"#,
    )
    .bind(user_id)
    .bind(ctx.tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    #[test]
    fn create_validates_email_and_role_first() {
        let ctx = AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 1,
            role: Role::Admin,
        };
        tokio_test::block_on(async {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost/unreachable")
                .unwrap();

            let err = create(&pool, &ctx, "  ", ROLE_MEMBER, None).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));

            let err = create(&pool, &ctx, "a@b.c", "owner", None).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        });
    }
}
