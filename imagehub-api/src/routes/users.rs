/// User endpoints
///
/// - `GET /api/v1/users/profile` - Caller's profile
/// - `PUT /api/v1/users/profile` - Update nickname/avatar (multipart)
/// - `PUT /api/v1/users/:id` - Update username/email (owner or admin)
/// - `PUT /api/v1/users/:id/role` - Change role (admin)
/// - `GET /api/v1/users` - List users (admin)

use axum::{extract::State, http::StatusCode, Extension};
use imagehub_shared::auth::middleware::AuthContext;
use imagehub_shared::models::user::{ParseRoleError, Role};
use imagehub_shared::services::user::UserRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::form::MultipartForm;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Json, Path, Query},
};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserRecord>,
    pub total: i64,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.users.get_profile(auth.user_id).await?))
}

/// Update the caller's profile
///
/// Multipart fields: `nickname` (text, blank leaves it unchanged) and
/// `avatar` (image file).
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    mut form: MultipartForm,
) -> ApiResult<Json<UserRecord>> {
    let user = state
        .users
        .update_profile(auth.user_id, form.text("nickname"), form.take_file("avatar"))
        .await?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserRecord>> {
    let user = state
        .users
        .update_username_email(&auth, user_id, req.username, req.email)
        .await?;

    Ok(Json(user))
}

/// Change a user's role
///
/// Returns `204 No Content`. Unknown role names are rejected with 400.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<StatusCode> {
    let role: Role = req
        .role
        .trim()
        .parse()
        .map_err(|e: ParseRoleError| ApiError::BadRequest(e.to_string()))?;

    state.users.update_role(&auth, user_id, role).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListUsersParams>,
) -> ApiResult<Json<UserListResponse>> {
    let page = state
        .users
        .list_users(params.page, params.page_size, params.search)
        .await?;

    Ok(Json(UserListResponse {
        users: page.items,
        total: page.total,
    }))
}
