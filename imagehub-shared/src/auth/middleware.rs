/// Request authentication
///
/// Resolves an `Authorization: Bearer <token>` header into an [`AuthContext`].
/// The api crate wraps [`authenticate`] in axum middleware and inserts the
/// context into request extensions.
///
/// # Checks (in order)
///
/// 1. Header present, else [`AuthError::MissingHeader`]
/// 2. Exactly two space-separated parts, the first being `Bearer`, else
///    [`AuthError::MalformedHeader`]
/// 3. Signature, issuer and expiry, else [`AuthError::InvalidSignature`] or
///    [`AuthError::Expired`]
/// 4. Token not on the blacklist, else [`AuthError::Blacklisted`]
/// 5. Subject still resolves to a user row, else [`AuthError::UnknownUser`]
///
/// # Example
///
/// ```no_run
/// use axum::http::HeaderMap;
/// use imagehub_shared::auth::jwt::JwtSettings;
/// use imagehub_shared::auth::middleware::authenticate;
/// use imagehub_shared::cache::blacklist::TokenBlacklist;
/// use sqlx::PgPool;
///
/// # async fn example(headers: HeaderMap, jwt: JwtSettings, pool: PgPool, blacklist: TokenBlacklist) {
/// match authenticate(&headers, &jwt, &pool, &blacklist).await {
///     Ok(ctx) => println!("user {} ({})", ctx.user_id, ctx.role),
///     Err(e) => println!("rejected: {}", e),
/// }
/// # }
/// ```

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{JwtError, JwtSettings};
use crate::cache::blacklist::TokenBlacklist;
use crate::models::user::{Role, User};

/// Authenticated caller, added to request extensions
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use imagehub_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {} ({})", auth.user_id, auth.role)
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    /// Role as stored at authentication time
    pub role: Role,

    /// Raw bearer token, kept for logout
    pub token: String,

    /// Token expiry
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Authentication failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authorization header is required")]
    MissingHeader,

    #[error("authorization header format must be Bearer {{token}}")]
    MalformedHeader,

    #[error("invalid token")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token has been revoked")]
    Blacklisted,

    #[error("user not found")]
    UnknownUser,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extracts the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Runs the full authentication chain against a request's headers
///
/// A failed blacklist lookup is logged and treated as "not revoked" so a
/// cache outage doesn't lock every user out.
pub async fn authenticate(
    headers: &HeaderMap,
    jwt: &JwtSettings,
    pool: &PgPool,
    blacklist: &TokenBlacklist,
) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;

    let claims = jwt.validate(token).map_err(|e| match e {
        JwtError::Expired => AuthError::Expired,
        _ => AuthError::InvalidSignature,
    })?;

    match blacklist.is_revoked(token).await {
        Ok(true) => return Err(AuthError::Blacklisted),
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Blacklist lookup failed, accepting token");
        }
    }

    let user = User::find_by_id(pool, claims.sub)
        .await?
        .ok_or(AuthError::UnknownUser)?;

    Ok(AuthContext {
        user_id: user.id,
        role: user.role,
        token: token.to_string(),
        expires_at: claims.expires_at(),
    })
}
