/// Best-effort cache for catalog listing pages
///
/// Keys encode the full query shape: page, page size, sort key and a SHA-256
/// digest of the search term and normalized label set. The digest keeps keys
/// bounded no matter what clients search for.
///
/// Failures never reach callers: a read error is logged and treated as a
/// miss, a write error is logged and dropped. Empty pages are not stored.
/// Entries are not invalidated on writes and simply age out after the TTL.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::SharedCache;
use crate::models::image::ImageFilter;

/// Default lifetime of a cached page
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(300);

/// A cached page together with the total it was computed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Clone)]
pub struct ListingCache {
    store: SharedCache,
    ttl: Duration,
}

impl ListingCache {
    pub fn new(store: SharedCache) -> Self {
        Self::with_ttl(store, DEFAULT_LISTING_TTL)
    }

    pub fn with_ttl(store: SharedCache, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Builds the cache key for one page of a filtered listing
    pub fn key(page: i64, page_size: i64, filter: &ImageFilter) -> String {
        let mut hasher = Sha256::new();
        // Every component is length-prefixed so no two filters share an encoding
        match filter.search.as_deref() {
            Some(search) => {
                hasher.update([1]);
                update_prefixed(&mut hasher, search);
            }
            None => hasher.update([0]),
        }
        hasher.update((filter.labels.len() as u64).to_be_bytes());
        for label in &filter.labels {
            update_prefixed(&mut hasher, label);
        }
        let digest = hex::encode(hasher.finalize());

        format!("images:{}:{}:{}:{}", page, page_size, filter.sort, digest)
    }

    /// Looks up a page; any error or undecodable payload counts as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CachedPage<T>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Listing cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(page) => {
                tracing::debug!(key, "Listing cache hit");
                Some(page)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable listing cache entry");
                None
            }
        }
    }

    /// Stores a non-empty page
    pub async fn put<T: Serialize>(&self, key: &str, page: &CachedPage<T>) {
        if page.items.is_empty() {
            return;
        }

        let raw = match serde_json::to_string(page) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode listing page");
                return;
            }
        };

        if let Err(e) = self.store.set_ex(key, &raw, self.ttl).await {
            tracing::warn!(key, error = %e, "Listing cache write failed");
        }
    }
}

fn update_prefixed(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
