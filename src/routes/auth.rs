use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::models::activity::RequestMeta;
use crate::routes::error::ApiError;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const USER_HEADER: &str = "x-user-id";

/// Caller identity asserted by the authenticating gateway in front of
/// this service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub organization_id: String,
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let organization_id = header_value(&parts.headers, ORGANIZATION_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing organization context".to_string()))?;
        let user_id = header_value(&parts.headers, USER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing user context".to_string()))?;

        Ok(Self {
            organization_id,
            user_id,
        })
    }
}

/// Client address and user agent, for the audit trail.
pub struct ClientMeta(pub RequestMeta);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = header_value(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
            .filter(|v| !v.is_empty());
        let user_agent = header_value(&parts.headers, "user-agent");

        Ok(Self(RequestMeta {
            ip_address,
            user_agent,
        }))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
