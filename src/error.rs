use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::responses::RequestMeta;

/// The error taxonomy shared by every ledger operation.
///
/// Each variant maps to a distinct client-facing status and a stable machine
/// code; `Internal` is logged with full context and returns a generic message.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("missing or invalid auth context")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("insufficient wallet balance")]
    InsufficientBalance,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Internal(e.into())
    }
}

impl LedgerError {
    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
            LedgerError::Forbidden => StatusCode::FORBIDDEN,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidState(_) => StatusCode::CONFLICT,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION",
            LedgerError::Unauthorized => "UNAUTHORIZED",
            LedgerError::Forbidden => "FORBIDDEN",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::Internal(_) => "INTERNAL",
        }
    }

    pub fn with_meta(self, meta: RequestMeta) -> ErrorWithMeta {
        ErrorWithMeta { error: self, meta }
    }
}

/// A `LedgerError` paired with the request metadata so the error body carries
/// the same request id the client sees in success envelopes.
#[derive(Debug)]
pub struct ErrorWithMeta {
    error: LedgerError,
    meta: RequestMeta,
}

impl IntoResponse for ErrorWithMeta {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let code = self.error.code();
        let message = match self.error {
            LedgerError::Internal(e) => {
                error!(request_id = %self.meta.request_id, "internal error: {:?}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "request_id": self.meta.request_id,
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_distinct_per_kind() {
        assert_eq!(
            LedgerError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(LedgerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(LedgerError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            LedgerError::NotFound("commission").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LedgerError::InvalidState("not pending".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::InsufficientBalance.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(LedgerError::NotFound("wallet").code(), "NOT_FOUND");
        assert_eq!(
            LedgerError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(LedgerError::InvalidState("x".into()).code(), "INVALID_STATE");
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(
            LedgerError::NotFound("commission").to_string(),
            "commission not found"
        );
    }
}
