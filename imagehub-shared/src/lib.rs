//! # ImageHub Shared Library
//!
//! Domain types, persistence, caching and business logic used by the
//! ImageHub API server.
//!
//! ## Module Organization
//!
//! - `auth`: JWT sessions, password hashing, request authentication, authorization checks
//! - `cache`: cache abstraction, Redis client, token blacklist, listing cache
//! - `db`: connection pool and migrations
//! - `models`: database models and queries
//! - `services`: user, image and deploy services
//! - `storage`: local upload storage

pub mod auth;
pub mod cache;
pub mod db;
pub mod models;
pub mod services;
pub mod storage;

/// Current version of the ImageHub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
