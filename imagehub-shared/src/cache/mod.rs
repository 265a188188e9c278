/// Key-value cache used for session revocation and listing pages
///
/// # Modules
///
/// - [`client`]: Redis-backed [`CacheStore`] with health checks
/// - [`memory`]: in-process [`CacheStore`] for tests and single-node setups
/// - [`blacklist`]: revoked session tokens (`blacklist:<token>`)
/// - [`listing`]: best-effort cache of catalog listing pages
///
/// Services receive the store as a [`SharedCache`] so the backend is chosen
/// once at startup.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use imagehub_shared::cache::{client::{RedisClient, RedisConfig}, CacheStore, SharedCache};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// let cache: SharedCache = Arc::new(client);
///
/// cache.set_ex("greeting", "hello", Duration::from_secs(60)).await?;
/// assert_eq!(cache.get("greeting").await?, Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod blacklist;
pub mod client;
pub mod listing;
pub mod memory;

/// Cache operation errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend unreachable or returned an error
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Command did not complete in time
    #[error("Cache command timed out")]
    Timeout,

    /// Cached payload could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal string key-value interface the services depend on
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a key; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes a key that expires after `ttl` (rounded up to whole seconds)
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Checks whether a key is present and unexpired
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Liveness probe
    async fn ping(&self) -> Result<bool, CacheError>;
}

/// Cache handle shared across services
pub type SharedCache = Arc<dyn CacheStore>;

/// Whole seconds for a TTL, never below one
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }
}
