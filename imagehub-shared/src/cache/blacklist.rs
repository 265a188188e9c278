/// Revoked session tokens
///
/// Logout stores `blacklist:<token>` with the owning user id as value. The
/// entry expires when the token itself would have expired, so the blacklist
/// never outgrows the set of still-valid tokens.

use std::time::Duration;

use uuid::Uuid;

use super::{CacheError, SharedCache};

const KEY_PREFIX: &str = "blacklist:";

#[derive(Clone)]
pub struct TokenBlacklist {
    store: SharedCache,
}

impl TokenBlacklist {
    pub fn new(store: SharedCache) -> Self {
        Self { store }
    }

    /// Cache key for a raw token string
    pub fn key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }

    /// Blacklists `token` for `remaining` (at least one second)
    pub async fn revoke(&self, token: &str, user_id: Uuid, remaining: Duration) -> Result<(), CacheError> {
        let ttl = remaining.max(Duration::from_secs(1));
        self.store
            .set_ex(&Self::key(token), &user_id.to_string(), ttl)
            .await?;

        tracing::info!(user_id = %user_id, ttl_secs = ttl.as_secs(), "Session token revoked");
        Ok(())
    }

    pub async fn is_revoked(&self, token: &str) -> Result<bool, CacheError> {
        self.store.exists(&Self::key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::cache::CacheStore;

    #[test]
    fn test_key_format() {
        assert_eq!(TokenBlacklist::key("abc.def.ghi"), "blacklist:abc.def.ghi");
    }

    #[tokio::test]
    async fn test_revoke_and_check() {
        let store = Arc::new(MemoryCache::new());
        let blacklist = TokenBlacklist::new(store.clone());
        let user_id = Uuid::new_v4();

        assert!(!blacklist.is_revoked("tok").await.unwrap());

        blacklist
            .revoke("tok", user_id, Duration::from_secs(3600))
            .await
            .expect("Should revoke");

        assert!(blacklist.is_revoked("tok").await.unwrap());
        assert!(!blacklist.is_revoked("other").await.unwrap());

        // Already-expired tokens still get a short-lived entry
        blacklist.revoke("late", user_id, Duration::ZERO).await.unwrap();
        assert!(blacklist.is_revoked("late").await.unwrap());

        let stored = store.get("blacklist:tok").await.unwrap();
        assert_eq!(stored, Some(user_id.to_string()));
    }
}
