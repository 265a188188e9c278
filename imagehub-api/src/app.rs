/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use imagehub_api::{app::AppState, config::Config};
/// use imagehub_shared::cache::client::RedisClient;
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let redis = RedisClient::new(config.redis_config()).await?;
/// let state = AppState::new(pool, Arc::new(redis), config);
/// let app = imagehub_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use imagehub_shared::auth::authorization::require_role;
use imagehub_shared::auth::jwt::JwtSettings;
use imagehub_shared::auth::middleware::{authenticate, AuthContext};
use imagehub_shared::cache::blacklist::TokenBlacklist;
use imagehub_shared::cache::listing::ListingCache;
use imagehub_shared::cache::SharedCache;
use imagehub_shared::models::user::Role;
use imagehub_shared::services::deploy::DeployService;
use imagehub_shared::services::image::ImageService;
use imagehub_shared::services::user::UserService;
use imagehub_shared::storage::uploads::FileStore;
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;
use crate::error::ApiError;
use crate::routes;

/// Room for multipart framing and text fields on top of the file limit
const MULTIPART_OVERHEAD: usize = 1 << 20;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every member is a cheap handle onto a shared resource.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Cache backend (Redis in production)
    pub cache: SharedCache,

    /// Application configuration
    pub config: Arc<Config>,

    /// Token signing and checking
    pub jwt: JwtSettings,

    pub blacklist: TokenBlacklist,
    pub files: FileStore,
    pub users: UserService,
    pub images: ImageService,
    pub deploy: DeployService,
}

impl AppState {
    /// Wires the services onto the given pool and cache
    pub fn new(db: PgPool, cache: SharedCache, config: Config) -> Self {
        let files = config.file_store();
        let blacklist = TokenBlacklist::new(cache.clone());

        let jwt = config.jwt_settings();

        let users = UserService::new(db.clone(), files.clone(), blacklist.clone(), jwt.clone());
        let images = ImageService::new(db.clone(), files.clone(), ListingCache::new(cache.clone()));
        let deploy = DeployService::new(db.clone());

        Self {
            db,
            cache,
            config: Arc::new(config),
            jwt,
            blacklist,
            files,
            users,
            images,
            deploy,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// ├── /uploads/*                       # Stored avatars and readmes (public)
/// └── /api/v1/
///     ├── /auth/register, /auth/login  # public
///     ├── /auth/logout                 # bearer
///     ├── /users/profile               # bearer (GET, PUT multipart)
///     ├── /users/:id                   # bearer (PUT)
///     ├── /users, /users/:id/role      # bearer + admin
///     ├── /images, /images/:id         # optional auth
///     ├── /images/:id/collect          # bearer (POST, DELETE)
///     ├── /orgs/:org_id/images         # GET optional (public org), POST bearer
///     ├── /orgs/:org_id/images/:id     # bearer (PUT, DELETE)
///     ├── /favorites                   # bearer
///     ├── /deploy/:id                  # bearer (GET, POST)
///     └── /providers                   # bearer
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Response compression
/// 4. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login));

    // Catalog reads; a valid token only adds per-caller starred flags
    let catalog_routes = Router::new()
        .route("/images", get(routes::images::list_images))
        .route("/images/:id", get(routes::images::get_image))
        .route("/orgs/:org_id/images", get(routes::images::list_org_images))
        .layer(from_fn_with_state(state.clone(), optional_auth_layer));

    // Routes that require a valid session
    let protected_routes = Router::new()
        .route("/auth/logout", post(routes::auth::logout))
        .route(
            "/users/profile",
            get(routes::users::get_profile).put(routes::users::update_profile),
        )
        .route("/users/:id", put(routes::users::update_user))
        .route(
            "/images/:id/collect",
            post(routes::images::collect).delete(routes::images::uncollect),
        )
        .route("/orgs/:org_id/images", post(routes::images::create_image))
        .route(
            "/orgs/:org_id/images/:id",
            put(routes::images::update_image).delete(routes::images::delete_image),
        )
        .route("/favorites", get(routes::images::list_favorites))
        .route(
            "/deploy/:id",
            get(routes::deploy::get_deploy_info).post(routes::deploy::deploy),
        )
        .route("/providers", get(routes::deploy::list_providers))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    // Admin-only routes
    let admin_routes = Router::new()
        .route("/users", get(routes::users::list_users))
        .route("/users/:id/role", put(routes::users::update_role))
        .layer(from_fn(require_admin_layer))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .merge(public_routes)
        .merge(catalog_routes)
        .merge(protected_routes)
        .merge(admin_routes);

    // Configure CORS based on environment
    let cors = if state.config.cors_permissive() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let body_limit = state.files.max_file_size() + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(state.files.root());

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/api/v1", v1_routes)
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer token, rejects blacklisted tokens and injects the
/// resulting [`AuthContext`] into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(req.headers(), &state.jwt, &state.db, &state.blacklist).await?;

    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// Optional authentication for public catalog routes
///
/// Requests without an `Authorization` header, or with one that fails
/// authentication, continue anonymously.
async fn optional_auth_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.headers().contains_key(header::AUTHORIZATION) {
        let result = authenticate(req.headers(), &state.jwt, &state.db, &state.blacklist).await;
        match result {
            Ok(auth) => {
                req.extensions_mut().insert(auth);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Continuing anonymously on public route");
            }
        }
    }

    next.run(req).await
}

/// Admin gate; must run after [`jwt_auth_layer`]
async fn require_admin_layer(req: Request, next: Next) -> Result<Response, ApiError> {
    let auth = req
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| ApiError::Unauthorized("authorization header is required".to_string()))?;

    require_role(auth, Role::Admin).map_err(|e| ApiError::Forbidden(e.to_string()))?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use imagehub_shared::auth::jwt::issue_token;
    use imagehub_shared::cache::memory::MemoryCache;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn test_state() -> AppState {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgresql://localhost/imagehub_unused".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        // Never connects unless a query runs
        let pool = PgPoolOptions::new().connect_lazy(&config.database.url).unwrap();
        AppState::new(pool, Arc::new(MemoryCache::new()), config)
    }

    async fn send(app: Router, method: &str, uri: &str, auth: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }

        dispatch(app, builder.body(Body::empty()).unwrap()).await
    }

    async fn send_json(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        dispatch(app, request).await
    }

    async fn dispatch(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = build_router(test_state());

        let (status, body) = send(app, "GET", "/api/v1/users/profile", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authorization header is required");
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        let state = test_state();

        for value in ["Token abc", "Bearer", "Bearer a b"] {
            let (status, _) = send(build_router(state.clone()), "GET", "/api/v1/favorites", Some(value)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{value}");
        }
    }

    #[tokio::test]
    async fn test_invalid_and_expired_tokens_are_unauthorized() {
        let state = test_state();

        let (status, body) =
            send(build_router(state.clone()), "GET", "/api/v1/providers", Some("Bearer not.a.jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");

        let expired = issue_token(Uuid::new_v4(), SECRET, Duration::seconds(-60)).unwrap();
        let (status, body) = send(
            build_router(state),
            "GET",
            "/api/v1/providers",
            Some(&format!("Bearer {}", expired)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token has expired");
    }

    #[tokio::test]
    async fn test_blacklisted_token_is_unauthorized() {
        let state = test_state();
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, SECRET, Duration::hours(1)).unwrap();

        state
            .blacklist
            .revoke(&token, user_id, std::time::Duration::from_secs(3600))
            .await
            .unwrap();

        let (status, body) = send(
            build_router(state),
            "POST",
            "/api/v1/auth/logout",
            Some(&format!("Bearer {}", token)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token has been revoked");
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let state = test_state();

        let (status, _) = send(build_router(state.clone()), "GET", "/api/v1/users", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(build_router(state), "PUT", "/api/v1/users/1/role", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, _) = send(build_router(test_state()), "GET", "/api/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_path_parameter_is_json_bad_request() {
        let state = test_state();

        let response = build_router(state.clone())
            .oneshot(Request::get("/api/v1/images/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid path parameter");

        let (status, body) = send(build_router(state), "GET", "/api/v1/images/1234", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid path parameter");
    }

    #[tokio::test]
    async fn test_bad_query_is_json_bad_request() {
        let (status, body) = send(build_router(test_state()), "GET", "/api/v1/images?page=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid query parameters");
    }

    #[tokio::test]
    async fn test_bad_json_body_is_json_bad_request() {
        let state = test_state();

        // Syntax error, then a well-formed body of the wrong shape
        for payload in [r#"{"username": "alice""#, r#"{"username": 42}"#] {
            let (status, body) = send_json(build_router(state.clone()), "POST", "/api/v1/auth/login", payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
            assert_eq!(body["error"], "invalid JSON body");
        }

        // No content type at all
        let (status, body) = send(build_router(state), "POST", "/api/v1/auth/register", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid JSON body");
    }
}
