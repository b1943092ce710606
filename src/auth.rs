use axum::{extract::FromRequestParts, http::HeaderMap, http::request::Parts};
use uuid::Uuid;

use crate::error::{ErrorWithMeta, LedgerError};
use crate::responses::RequestMeta;

pub const HEADER_TENANT_ID: &str = "x-tenant-id";
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_ROLE: &str = "x-role";

/// The acting principal's role, as resolved by the external auth layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Option<Role> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The tenant and principal every operation acts on behalf of.
///
/// The external auth collaborator verifies credentials and forwards the
/// resolved triple in trusted headers; the core takes it at face value.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub tenant_id: Uuid,
    pub user_id: i64,
    pub role: Role,
}

impl AuthContext {
    /// Explicit capability check; the first step of every admin operation.
    pub fn require_admin(&self) -> Result<(), LedgerError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(LedgerError::Forbidden)
        }
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, LedgerError> {
        let tenant_id = headers
            .get(HEADER_TENANT_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(LedgerError::Unauthorized)?;
        let user_id = headers
            .get(HEADER_USER_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(LedgerError::Unauthorized)?;
        let role = headers
            .get(HEADER_ROLE)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or(LedgerError::Unauthorized)?;
        Ok(AuthContext {
            tenant_id,
            user_id,
            role,
        })
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ErrorWithMeta;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let meta = parts
            .extensions
            .get::<RequestMeta>()
            .cloned()
            .unwrap_or_default();
        AuthContext::from_headers(&parts.headers).map_err(|e| e.with_meta(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(tenant: &str, user: &str, role: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(HEADER_TENANT_ID, HeaderValue::from_str(tenant).unwrap());
        h.insert(HEADER_USER_ID, HeaderValue::from_str(user).unwrap());
        h.insert(HEADER_ROLE, HeaderValue::from_str(role).unwrap());
        h
    }

    #[test]
    fn parses_a_complete_context() {
        let tenant = Uuid::new_v4();
        let ctx =
            AuthContext::from_headers(&headers(&tenant.to_string(), "42", "admin")).unwrap();
        assert_eq!(ctx.tenant_id, tenant);
        assert_eq!(ctx.user_id, 42);
        assert_eq!(ctx.role, Role::Admin);
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let tenant = Uuid::new_v4().to_string();
        assert!(AuthContext::from_headers(&HeaderMap::new()).is_err());
        assert!(AuthContext::from_headers(&headers("not-a-uuid", "42", "member")).is_err());
        assert!(AuthContext::from_headers(&headers(&tenant, "forty-two", "member")).is_err());
        assert!(AuthContext::from_headers(&headers(&tenant, "42", "superuser")).is_err());
    }

    #[test]
    fn member_role_cannot_pass_the_admin_check() {
        let ctx = AuthContext {
            tenant_id: Uuid::new_v4(),
            user_id: 7,
            role: Role::Member,
        };
        assert!(matches!(
            ctx.require_admin(),
            Err(LedgerError::Forbidden)
        ));

        let admin = AuthContext { role: Role::Admin, ..ctx };
        assert!(admin.require_admin().is_ok());
    }
}
