//! The main library for the multi-tenant commission ledger.
//!
//! Members of a per-tenant sponsorship tree place orders; tiered commissions
//! are credited to each upline ancestor's wallet in the same transaction, and
//! administrators approve or reverse commissions and settle withdrawals.

pub mod api;
pub mod audit;
pub mod auth;
pub mod commissions;
pub mod config;
pub mod error;
pub mod members;
pub mod orders;
pub mod responses;
pub mod rules;
pub mod types;
pub mod upline;
pub mod wallets;
pub mod withdrawals;

use anyhow::Context;
use anyhow::Result;
pub use api::init_router;
pub use auth::{AuthContext, Role};
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
pub use types::AppState;

/// Initializes the database pool.
pub async fn init_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    Ok(pool)
}
