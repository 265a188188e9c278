/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/auth/register` - Create an account and get a session token
/// - `POST /api/v1/auth/login` - Exchange credentials for a session token
/// - `POST /api/v1/auth/logout` - Revoke the current session token

use axum::{extract::State, http::StatusCode, Extension};
use imagehub_shared::auth::middleware::AuthContext;
use imagehub_shared::services::user::{RegisterInput, UserRecord};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{app::AppState, error::ApiResult, extract::Json};

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "username must be between 3 and 50 characters"))]
    pub username: String,

    #[validate(email(message = "invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "password must be at least 6 characters long"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new user
///
/// ```text
/// POST /api/v1/auth/register
/// Content-Type: application/json
///
/// { "username": "alice", "email": "alice@example.com", "password": "hunter22" }
/// ```
///
/// Returns `201 Created` with the user record and a `token`.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed, or username/email already exists
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    req.validate()?;

    let user = state
        .users
        .register(RegisterInput {
            username: req.username,
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login
///
/// # Errors
///
/// - `401 Unauthorized`: `invalid username or password`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<UserRecord>> {
    req.validate()?;

    let user = state.users.login(&req.username, &req.password).await?;
    Ok(Json(user))
}

/// Logout
///
/// The token stays blacklisted until it would have expired.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MessageResponse>> {
    state.users.logout(&auth).await?;

    Ok(Json(MessageResponse {
        message: "logged out".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "hunter22".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            username: "al".to_string(),
            email: "nope".to_string(),
            password: "123".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_login_request_requires_fields() {
        let req = LoginRequest {
            username: String::new(),
            password: "x".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
