/// Database models for ImageHub
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `user`: User accounts, credentials and roles
/// - `image`: Catalog entries, filtered listing and star counters
/// - `label`: Free-form tags attached to images
/// - `collection`: Per-user starred images
/// - `provider`: Deployment providers and per-image deployment parameters
///
/// Functions that take a generic `E: PgExecutor` run equally against the pool
/// or inside a transaction (`&mut *tx`).

pub mod collection;
pub mod image;
pub mod label;
pub mod provider;
pub mod user;

/// Builds an `ILIKE` substring pattern, escaping the LIKE wildcards in `term`
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
