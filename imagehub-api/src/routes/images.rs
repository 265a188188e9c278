/// Image catalog endpoints
///
/// # Endpoints
///
/// - `GET /api/v1/images` - Catalog listing (optional auth)
/// - `GET /api/v1/images/:id` - Image detail (optional auth)
/// - `POST|DELETE /api/v1/images/:id/collect` - Star / unstar
/// - `GET /api/v1/orgs/public/images` - Catalog listing for the public org
/// - `POST /api/v1/orgs/:org_id/images` - Create (multipart)
/// - `PUT /api/v1/orgs/:org_id/images/:id` - Update (multipart, author only)
/// - `DELETE /api/v1/orgs/:org_id/images/:id` - Delete (author only)
/// - `GET /api/v1/favorites` - Caller's collection
///
/// # Listing parameters
///
/// `page`, `page_size` (clamped to 1..=100), `search`, `labels`
/// (comma-separated, all required) and `sort` (`stars`, `created_at`,
/// `updated_at`; always descending).

use axum::{extract::State, http::StatusCode, Extension};
use imagehub_shared::auth::middleware::AuthContext;
use imagehub_shared::models::image::ImageSort;
use imagehub_shared::services::image::{
    CreateImageInput, ImageQuery, ImageRecord, UpdateImageInput, PUBLIC_ORG_SEGMENT,
};
use imagehub_shared::services::Page;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::form::{split_list, MultipartForm};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Json, Path, Query},
};

/// Multipart field carrying the readme file
const README_FIELD: &str = "readme_file";

#[derive(Debug, Default, Deserialize)]
pub struct ImageListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub labels: Option<String>,
    pub sort: Option<String>,
}

impl From<ImageListParams> for ImageQuery {
    fn from(params: ImageListParams) -> Self {
        ImageQuery {
            page: params.page,
            page_size: params.page_size,
            search: params.search,
            labels: params.labels.as_deref().map(split_list).unwrap_or_default(),
            sort: ImageSort::parse_or_default(params.sort.as_deref()),
        }
    }
}

/// `{ "data": [...], "total": n }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub data: Vec<ImageRecord>,
    pub total: i64,
}

impl From<Page<ImageRecord>> for ImageListResponse {
    fn from(page: Page<ImageRecord>) -> Self {
        Self {
            data: page.items,
            total: page.total,
        }
    }
}

fn caller(auth: &Option<Extension<AuthContext>>) -> Option<Uuid> {
    auth.as_ref().map(|Extension(ctx)| ctx.user_id)
}

pub async fn list_images(
    State(state): State<AppState>,
    auth: Option<Extension<AuthContext>>,
    Query(params): Query<ImageListParams>,
) -> ApiResult<Json<ImageListResponse>> {
    let page = state.images.list(params.into(), caller(&auth)).await?;
    Ok(Json(page.into()))
}

/// Listing under an org path; only the public org has a listing
pub async fn list_org_images(
    State(state): State<AppState>,
    auth: Option<Extension<AuthContext>>,
    Path(org_id): Path<String>,
    Query(params): Query<ImageListParams>,
) -> ApiResult<Json<ImageListResponse>> {
    if org_id != PUBLIC_ORG_SEGMENT {
        return Err(ApiError::NotFound("organization not found".to_string()));
    }

    let page = state.images.list(params.into(), caller(&auth)).await?;
    Ok(Json(page.into()))
}

pub async fn get_image(
    State(state): State<AppState>,
    auth: Option<Extension<AuthContext>>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<ImageRecord>> {
    Ok(Json(state.images.get(image_id, caller(&auth)).await?))
}

/// Create an image
///
/// Multipart text fields: `name`, `description`, `registry`, `namespace`,
/// `repository`, `tag`, `digest`, `size`, `visibility`, `platform`,
/// `labels` (repeatable or comma-separated). File field: `readme_file`.
///
/// Returns `201 Created`.
pub async fn create_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<String>,
    mut form: MultipartForm,
) -> ApiResult<(StatusCode, Json<ImageRecord>)> {
    let input = CreateImageInput {
        name: form.text("name").unwrap_or_default(),
        description: form.text("description"),
        registry: form.text("registry").unwrap_or_default(),
        namespace: form.text("namespace"),
        repository: form.text("repository").unwrap_or_default(),
        tag: form.text("tag").unwrap_or_default(),
        digest: form.text("digest").unwrap_or_default(),
        size: form.integer("size")?,
        visibility: form.text("visibility").unwrap_or_default(),
        platform: form.text("platform").unwrap_or_default(),
        labels: form.list("labels"),
    };
    let readme = form.take_file(README_FIELD);

    let image = state
        .images
        .create(&org_id, auth.user_id, input, readme)
        .await?;

    Ok((StatusCode::CREATED, Json(image)))
}

/// Update an image (author only)
///
/// Same fields as create, all optional; blank values leave the column
/// unchanged. A non-empty `labels` replaces the label set.
pub async fn update_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((_org_id, image_id)): Path<(String, Uuid)>,
    mut form: MultipartForm,
) -> ApiResult<Json<ImageRecord>> {
    let input = UpdateImageInput {
        name: form.text("name"),
        description: form.text("description"),
        registry: form.text("registry"),
        namespace: form.text("namespace"),
        repository: form.text("repository"),
        tag: form.text("tag"),
        visibility: form.text("visibility"),
        platform: form.text("platform"),
        labels: form.list("labels"),
    };
    let readme = form.take_file(README_FIELD);

    let image = state
        .images
        .update(image_id, auth.user_id, input, readme)
        .await?;

    Ok(Json(image))
}

/// Delete an image (author only); returns `204 No Content`
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((_org_id, image_id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    state.images.delete(image_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn collect(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.images.collect(auth.user_id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn uncollect(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.images.uncollect(auth.user_id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ImageListParams>,
) -> ApiResult<Json<ImageListResponse>> {
    let page = state.images.favorites(params.into(), auth.user_id).await?;
    Ok(Json(page.into()))
}
