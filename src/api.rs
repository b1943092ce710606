use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::ErrorWithMeta;
use crate::responses::{ApiOk, RequestMeta, meta_middleware};
use crate::types::{AppState, Commission, EarningsRow, MemberRecord};
use crate::{commissions, members, orders, wallets, withdrawals};

/// The request to place a new order.
#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    /// The order total in minor units.
    pub total_amount: i64,
    /// Client-supplied replay-protection token.
    pub idempotency_key: Option<String>,
}

/// The response after placing an order.
#[derive(Serialize)]
pub struct PlaceOrderResponse {
    /// The ID of the order.
    pub order_id: Uuid,
    /// True when the idempotency key matched an existing order.
    pub idempotent: bool,
}

/// The request to withdraw funds.
#[derive(Deserialize)]
pub struct WithdrawalRequestBody {
    /// The amount in minor units.
    pub amount: i64,
    /// Client-supplied replay-protection token.
    pub idempotency_key: Option<String>,
}

/// The response after requesting a withdrawal.
#[derive(Serialize)]
pub struct WithdrawalResponse {
    /// The ID of the withdrawal request.
    pub id: i64,
    /// The request status.
    pub status: String,
    /// True when the idempotency key matched an existing request.
    pub idempotent: bool,
}

/// The response for a member's wallet balance.
#[derive(Serialize)]
pub struct BalanceResponse {
    /// The ID of the wallet owner.
    pub user_id: i64,
    /// The balance in minor units.
    pub balance: i64,
}

/// The response after a commission state transition.
#[derive(Serialize)]
pub struct CommissionActionResponse {
    /// The ID of the commission.
    pub commission_id: i64,
    /// The new status.
    pub status: &'static str,
}

/// The response after approving a withdrawal.
#[derive(Serialize)]
pub struct WithdrawalActionResponse {
    /// The ID of the withdrawal.
    pub withdrawal_id: i64,
    /// The new status.
    pub status: &'static str,
}

/// The request to create a new member.
#[derive(Deserialize)]
pub struct CreateMemberRequest {
    /// The member's email, unique per tenant.
    pub email: String,
    /// The member's role; defaults to `member`.
    pub role: Option<String>,
    /// The sponsoring member, if any.
    pub sponsor_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct DownlineQuery {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct ListCommissionsQuery {
    pub status: Option<String>,
}

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/members", post(create_member_handler))
        .route("/members/downline", get(downline_handler))
        .route("/wallet", get(get_wallet_handler))
        .route("/orders", post(place_order_handler))
        .route("/withdrawals", post(request_withdrawal_handler))
        .route(
            "/admin/commissions/{id}/approve",
            post(approve_commission_handler),
        )
        .route(
            "/admin/commissions/{id}/reverse",
            post(reverse_commission_handler),
        )
        .route("/admin/commissions", get(list_commissions_handler))
        .route(
            "/admin/withdrawals/{id}/approve",
            post(approve_withdrawal_handler),
        )
        .route("/admin/reports/earnings", get(earnings_report_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(meta_middleware))
}

async fn health_handler(State(st): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&st.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected" })),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "db": "not connected" })),
        ),
    }
}

async fn create_member_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Json(req): Json<CreateMemberRequest>,
) -> Result<ApiOk<MemberRecord>, ErrorWithMeta> {
    let role = req.role.as_deref().unwrap_or(members::ROLE_MEMBER);
    let member = members::create(&st.pool, &ctx, &req.email, role, req.sponsor_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("member created", member, meta))
}

async fn downline_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Query(q): Query<DownlineQuery>,
) -> Result<ApiOk<Vec<MemberRecord>>, ErrorWithMeta> {
    let rows = members::downline(&st.pool, &ctx, q.user_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("downline fetched", rows, meta))
}

async fn get_wallet_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
) -> Result<ApiOk<BalanceResponse>, ErrorWithMeta> {
    let balance = wallets::balance(&st.pool, ctx.tenant_id, ctx.user_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok(
        "balance fetched",
        BalanceResponse {
            user_id: ctx.user_id,
            balance,
        },
        meta,
    ))
}

async fn place_order_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<ApiOk<PlaceOrderResponse>, ErrorWithMeta> {
    let placed = orders::place_order(
        &st.pool,
        &ctx,
        req.total_amount,
        req.idempotency_key.as_deref(),
        st.config.upline_max_depth,
    )
    .await
    .map_err(|e| e.with_meta(meta.clone()))?;

    let body = PlaceOrderResponse {
        order_id: placed.order_id,
        idempotent: placed.idempotent,
    };
    if placed.idempotent {
        Ok(ApiOk::ok("order replayed", body, meta))
    } else {
        Ok(ApiOk::created("order placed", body, meta))
    }
}

async fn request_withdrawal_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Json(req): Json<WithdrawalRequestBody>,
) -> Result<ApiOk<WithdrawalResponse>, ErrorWithMeta> {
    let requested =
        withdrawals::request(&st.pool, &ctx, req.amount, req.idempotency_key.as_deref())
            .await
            .map_err(|e| e.with_meta(meta.clone()))?;

    let body = WithdrawalResponse {
        id: requested.id,
        status: requested.status,
        idempotent: requested.idempotent,
    };
    if requested.idempotent {
        Ok(ApiOk::ok("withdrawal replayed", body, meta))
    } else {
        Ok(ApiOk::created("withdrawal requested", body, meta))
    }
}

async fn approve_commission_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Path(id): Path<i64>,
) -> Result<ApiOk<CommissionActionResponse>, ErrorWithMeta> {
    commissions::approve(&st.pool, &ctx, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok(
        "commission approved",
        CommissionActionResponse {
            commission_id: id,
            status: orders::COMMISSION_STATUS_APPROVED,
        },
        meta,
    ))
}

async fn reverse_commission_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Path(id): Path<i64>,
) -> Result<ApiOk<CommissionActionResponse>, ErrorWithMeta> {
    commissions::reverse(&st.pool, &ctx, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok(
        "commission reversed",
        CommissionActionResponse {
            commission_id: id,
            status: orders::COMMISSION_STATUS_REVERSED,
        },
        meta,
    ))
}

async fn list_commissions_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Query(q): Query<ListCommissionsQuery>,
) -> Result<ApiOk<Vec<Commission>>, ErrorWithMeta> {
    let rows = commissions::list(&st.pool, &ctx, q.status.as_deref())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("commissions fetched", rows, meta))
}

async fn approve_withdrawal_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
    Path(id): Path<i64>,
) -> Result<ApiOk<WithdrawalActionResponse>, ErrorWithMeta> {
    withdrawals::approve(&st.pool, &ctx, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok(
        "withdrawal approved",
        WithdrawalActionResponse {
            withdrawal_id: id,
            status: withdrawals::WITHDRAWAL_STATUS_APPROVED,
        },
        meta,
    ))
}

async fn earnings_report_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    ctx: AuthContext,
) -> Result<ApiOk<Vec<EarningsRow>>, ErrorWithMeta> {
    let rows = commissions::earnings_report(&st.pool, &ctx)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("earnings report fetched", rows, meta))
}
