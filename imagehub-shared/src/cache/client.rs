//! Redis client wrapper implementing [`CacheStore`]
//!
//! Wraps `redis::aio::ConnectionManager`, which reconnects on its own, and
//! bounds every command with the configured timeout.
//!
//! # Example
//!
//! ```no_run
//! use imagehub_shared::cache::client::{RedisClient, RedisConfig};
//! use imagehub_shared::cache::CacheStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
//!
//! let healthy = client.ping().await?;
//! println!("Redis healthy: {}", healthy);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{Deserialize, Serialize};

use super::{ttl_seconds, CacheError, CacheStore};

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => CacheError::Backend(format!("IO error: {}", err)),
            redis::ErrorKind::ResponseError => {
                CacheError::Backend(format!("Response error: {}", err))
            }
            _ => CacheError::Backend(err.to_string()),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, `redis://[username:password@]host:port[/db]`
    pub url: String,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    /// Configuration for `url` with default timeouts (5s connect, 10s command)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            command_timeout_secs: 10,
        }
    }
}

/// Redis-backed cache store
///
/// Cloning is cheap; all clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` if the URL is invalid or the connection
    /// fails, and `CacheError::Timeout` if it doesn't complete within
    /// `connection_timeout_secs`.
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Backend(format!("Invalid Redis URL: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(|e| CacheError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!(
            "Redis client connected successfully to {}",
            sanitize_url(&config.url)
        );

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// URL with credentials masked, for logs and health output
    pub fn display_url(&self) -> String {
        sanitize_url(&self.config.url)
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        tokio::time::timeout(Duration::from_secs(self.config.command_timeout_secs), fut)
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(CacheError::from)
    }
}

#[async_trait]
impl CacheStore for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        self.with_timeout(conn.get::<_, Option<String>>(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_seconds(ttl));

        self.with_timeout(cmd.query_async::<_, ()>(&mut conn)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        self.with_timeout(conn.exists::<_, bool>(key)).await
    }

    async fn ping(&self) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let pong: String = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await?;

        if pong == "PONG" {
            tracing::debug!("Redis health check: PONG received");
            Ok(true)
        } else {
            tracing::warn!("Redis health check: unexpected response: {}", pong);
            Ok(false)
        }
    }
}

/// Replaces `username:password` with `***:***`
fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let host = &url[at_pos + 1..];
            return format!("{}***:***@{}", scheme, host);
        }
    }
    url.to_string()
}
