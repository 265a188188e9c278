/// Business logic shared by the HTTP layer
///
/// Each service is a cheaply cloneable struct holding the handles it needs
/// (pool, cache, file store), built once at startup and injected into the
/// router state.
///
/// - [`user`]: registration, login, logout, profile and role management
/// - [`image`]: catalog listing, CRUD and collections
/// - [`deploy`]: provider configuration lookup and storage

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::auth::authorization::AuthzError;
use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::cache::CacheError;
use crate::storage::uploads::StorageError;

pub mod deploy;
pub mod image;
pub mod user;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size used when the client sends none
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Service error taxonomy; the api crate maps each variant to a status code
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("image already in collection")]
    AlreadyCollected,

    #[error("image not in collection")]
    NotInCollection,

    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let message = match db_err.constraint() {
                    Some(c) if c.contains("username") => "username already exists",
                    Some(c) if c.contains("email") => "email already exists",
                    Some(c) if c.contains("providers_name") => "provider already exists",
                    _ => "resource already exists",
                };
                return ServiceError::Duplicate(message.to_string());
            }
        }

        ServiceError::Internal(format!("database error: {}", err))
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        ServiceError::Internal(format!("password operation failed: {}", err))
    }
}

impl From<JwtError> for ServiceError {
    fn from(err: JwtError) -> Self {
        ServiceError::Internal(format!("token operation failed: {}", err))
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_client_error() {
            ServiceError::Validation(err.to_string())
        } else {
            ServiceError::Internal(err.to_string())
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::Forbidden(err.to_string())
    }
}

/// A normalized page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-indexed page number
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// Lenient normalization for catalog listings: `page < 1` becomes 1,
    /// `page_size < 1` becomes the default and anything above the maximum is
    /// clamped
    pub fn clamped(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let page_size = match page_size {
            Some(size) if size >= 1 => size.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        Self { page, page_size }
    }

    /// Strict normalization for admin listings: missing values take the
    /// defaults, out-of-range values are rejected
    pub fn strict(page: Option<i64>, page_size: Option<i64>) -> ServiceResult<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(ServiceError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ServiceError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(Self { page, page_size })
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// A file received in a multipart request, not yet stored
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Client-supplied file name; only its extension is kept
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Trims a client-supplied optional field; blank means "not supplied"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Rejects values longer than the column they are stored in
///
/// Lengths are counted in characters, as `VARCHAR(n)` does.
pub(crate) fn check_length(field: &str, value: &str, max: usize) -> ServiceResult<()> {
    if value.chars().count() > max {
        return Err(ServiceError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

/// One page of results and the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
