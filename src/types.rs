use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;

/// The application state.
#[derive(Clone)]
pub struct AppState {
    /// The database pool.
    pub pool: PgPool,
    /// The application configuration.
    pub config: Config,
}

/// A commission owed to an upline member for one order.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Commission {
    /// The ID of the commission.
    pub id: i64,
    /// The order that produced it.
    pub order_id: Uuid,
    /// The upline member it is owed to.
    pub recipient_user_id: i64,
    /// The amount in minor units.
    pub amount: i64,
    /// Sponsor-hops between the order placer and the recipient.
    pub level: i32,
    /// `pending`, `approved` or `reversed`.
    pub status: String,
    /// The timestamp when the commission was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A member of a tenant's sponsorship tree.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MemberRecord {
    /// The ID of the member.
    pub id: i64,
    /// The member's email, unique per tenant.
    pub email: String,
    /// The member's role.
    pub role: String,
    /// The sponsoring member, if any.
    pub sponsor_id: Option<i64>,
    /// The member's status.
    pub status: String,
    /// The timestamp when the member was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One row of the per-member earnings report.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EarningsRow {
    /// The ID of the member.
    pub user_id: i64,
    /// The member's email.
    pub email: String,
    /// The sum of the member's approved commissions.
    pub total_earned: i64,
}
