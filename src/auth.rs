use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::SessionUser,
    repository::{RepoError, RepositoryState},
};

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "lms_session";

/// Roles that grant the `admin` navigation audience.
pub const ADMIN_ROLES: [&str; 3] = ["ADMIN", "SUPER_ADMIN", "MAESTRO"];

/// SessionLookup
///
/// The persistence contract the auth layer needs. Session tokens are never stored in the
/// clear, so lookups are keyed by the token hash.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    /// Returns the ACTIVE user owning an unrevoked, unexpired session with this token hash.
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, RepoError>;

    /// Returns an ACTIVE user by id. Backs the local `x-user-id` bypass.
    async fn find_active_user(&self, id: Uuid) -> Result<Option<SessionUser>, RepoError>;
}

/// Extracts the session token from a raw `Cookie` header value.
pub fn parse_session_token(cookie_header: Option<&str>) -> Option<&str> {
    let prefix = format!("{}=", SESSION_COOKIE);
    cookie_header?
        .split(';')
        .map(str::trim)
        .find_map(|segment| segment.strip_prefix(prefix.as_str()))
        .filter(|token| !token.is_empty())
}

/// Lowercase hex SHA-256 of a session token, the form stored in `api_sessions.token_hash`.
pub fn hash_session_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Reads the `Cookie` header as a string, if present and valid ASCII.
pub fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
}

/// resolve_session
///
/// Resolves the session named by a cookie header. A missing cookie is not an error and
/// short-circuits without touching the store.
pub async fn resolve_session<L>(
    cookie_header: Option<&str>,
    lookup: &L,
) -> Result<Option<SessionUser>, RepoError>
where
    L: SessionLookup + ?Sized,
{
    let Some(token) = parse_session_token(cookie_header) else {
        return Ok(None);
    };
    lookup.find_session_user(&hash_session_token(token)).await
}

impl SessionUser {
    /// True when any role grants the admin audience.
    pub fn is_admin(&self) -> bool {
        roles_grant_admin(&self.roles)
    }
}

pub fn roles_grant_admin(roles: &[String]) -> bool {
    roles.iter().any(|role| ADMIN_ROLES.contains(&role.as_str()))
}

/// SessionUser Extractor Implementation
///
/// Makes `SessionUser` usable as a handler argument on any route that requires a session.
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an active user authenticates.
/// 2. Cookie: the `lms_session` token is hashed and looked up.
///
/// Rejection: 401 when no session resolves, 500 when the store fails.
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.dev_tools_enabled() {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id_str| Uuid::parse_str(id_str).ok());

            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.find_active_user(user_id).await? {
                    return Ok(user);
                }
            }
        }
        // Production, or a bypass header that did not resolve: fall through to the cookie.

        resolve_session(cookie_header(&parts.headers), repo.as_ref())
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

/// RequestId
///
/// The correlation id set by `SetRequestIdLayer`. Falls back to a fresh UUID when the
/// handler is invoked outside the layered router (e.g. direct handler tests).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(RequestId(id))
    }
}
