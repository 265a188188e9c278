//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - Database and Redis connections from the environment
//! - An upload directory that is removed with the context
//! - Registered test users with tokens
//! - Request helpers for JSON and multipart bodies

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use imagehub_api::app::{build_router, AppState};
use imagehub_api::config::Config;
use imagehub_shared::cache::client::RedisClient;
use imagehub_shared::models::provider::Provider;
use imagehub_shared::models::user::{Role, User};
use imagehub_shared::services::user::RegisterInput;
use serde_json::Value;
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "password123";

const BOUNDARY: &str = "imagehub-test-boundary";

/// A registered user and a token for it
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// A file part for [`TestContext::send_multipart`]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub state: AppState,
    pub app: Router,
    users: Mutex<Vec<Uuid>>,
    providers: Mutex<Vec<Uuid>>,
    _uploads: TempDir,
}

impl TestContext {
    /// Connects to the services named by the environment and runs migrations
    pub async fn new() -> anyhow::Result<Self> {
        let mut config = Config::from_env()?;

        let uploads = tempfile::tempdir()?;
        config.uploads.dir = uploads.path().to_string_lossy().into_owned();

        let db = PgPool::connect(&config.database.url).await?;

        // Path relative to Cargo.toml, not this file
        sqlx::migrate!("../migrations").run(&db).await?;

        let redis = RedisClient::new(config.redis_config()).await?;

        let state = AppState::new(db.clone(), Arc::new(redis), config);
        let app = build_router(state.clone());

        Ok(Self {
            db,
            state,
            app,
            users: Mutex::new(Vec::new()),
            providers: Mutex::new(Vec::new()),
            _uploads: uploads,
        })
    }

    /// Registers a user with a unique name derived from `prefix`
    pub async fn register_user(&self, prefix: &str) -> anyhow::Result<TestUser> {
        let suffix = Uuid::new_v4().simple().to_string();
        let username = format!("{}_{}", prefix, &suffix[..12]);
        let email = format!("{}@example.com", username);

        let record = self
            .state
            .users
            .register(RegisterInput {
                username: username.clone(),
                email: email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await?;

        self.track_user(record.id);

        let token = record
            .token
            .ok_or_else(|| anyhow::anyhow!("registration returned no token"))?;

        Ok(TestUser {
            id: record.id,
            username,
            email,
            token,
        })
    }

    /// Registers a user and promotes it to admin
    pub async fn register_admin(&self, prefix: &str) -> anyhow::Result<TestUser> {
        let user = self.register_user(prefix).await?;
        User::update_role(&self.db, user.id, Role::Admin).await?;
        Ok(user)
    }

    /// Records a user created outside [`register_user`] for cleanup
    pub fn track_user(&self, id: Uuid) {
        if let Ok(mut users) = self.users.lock() {
            users.push(id);
        }
    }

    /// Inserts a provider row; providers are seeded by operators, not the API
    pub async fn create_provider(&self, name: &str, api_url: &str) -> anyhow::Result<Provider> {
        let provider = sqlx::query_as::<_, Provider>(
            "INSERT INTO providers (id, name, api_url) VALUES ($1, $2, $3) RETURNING id, name, api_url",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(api_url)
        .fetch_one(&self.db)
        .await?;

        if let Ok(mut providers) = self.providers.lock() {
            providers.push(provider.id);
        }

        Ok(provider)
    }

    /// Number of collection rows pointing at an image
    pub async fn collection_rows(&self, image_id: &str) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE image_id = $1")
            .bind(image_id.parse::<Uuid>()?)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Sends a request with an optional JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&TestUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = auth {
            builder = builder.header(header::AUTHORIZATION, user.bearer());
        }

        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.dispatch(builder.body(body).unwrap()).await
    }

    /// Sends a `multipart/form-data` request
    pub async fn send_multipart(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&TestUser>,
        fields: &[(&str, &str)],
        file: Option<FilePart<'_>>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(user) = auth {
            builder = builder.header(header::AUTHORIZATION, user.bearer());
        }

        let body = multipart_body(fields, file);
        self.dispatch(builder.body(Body::from(body)).unwrap()).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Creates an image in the public org and returns its JSON
    pub async fn create_image(&self, author: &TestUser, name: &str, labels: &str) -> Value {
        let (status, body) = self
            .send_multipart(
                "POST",
                "/api/v1/orgs/public/images",
                Some(author),
                &[
                    ("name", name),
                    ("description", "integration test image"),
                    ("registry", "docker.io"),
                    ("namespace", "library"),
                    ("repository", name),
                    ("tag", "latest"),
                    ("digest", "sha256:0123456789abcdef"),
                    ("size", "1024"),
                    ("visibility", "public"),
                    ("platform", "linux/amd64"),
                    ("labels", labels),
                ],
                None,
            )
            .await;

        assert_eq!(status, StatusCode::CREATED, "create image failed: {}", body);
        body
    }

    /// Removes everything the tracked users created
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let ids: Vec<Uuid> = match self.users.lock() {
            Ok(users) => users.clone(),
            Err(_) => return Ok(()),
        };
        let providers: Vec<Uuid> = self
            .providers
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();

        // image_labels, collections and image_providers cascade from images
        sqlx::query("DELETE FROM images WHERE author = ANY($1)")
            .bind(&ids)
            .execute(&self.db)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.db)
            .await?;
        sqlx::query("DELETE FROM providers WHERE id = ANY($1)")
            .bind(&providers)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

/// Unique suffix for names that must not collide across test runs
pub fn unique(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..12])
}

fn multipart_body(fields: &[(&str, &str)], file: Option<FilePart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }

    if let Some(part) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, part.field, part.file_name, part.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
