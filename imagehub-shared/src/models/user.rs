/// User model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     username VARCHAR(50) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     nickname VARCHAR(100) NOT NULL DEFAULT '',
///     avatar TEXT NOT NULL DEFAULT '',
///     role user_role NOT NULL DEFAULT 'user',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use imagehub_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     nickname: "alice".to_string(),
/// }).await?;
///
/// let found = User::find_by_username(&pool, "alice").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::like_pattern;

/// Width of `users.nickname`
pub const MAX_NICKNAME_LENGTH: usize = 100;

/// Width of `users.email`
pub const MAX_EMAIL_LENGTH: usize = 255;

/// Account role
///
/// Closed set: anything other than `user` or `admin` is rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account
    #[default]
    User,

    /// Can list users and change roles
    Admin,
}

impl Role {
    /// Converts role to its wire/storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// User account row
///
/// `password_hash` is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Unique login name, 3-50 characters
    pub username: String,

    /// Unique email address
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Display name; defaults to the username
    pub nickname: String,

    /// Stored avatar path relative to the uploads root, empty when unset
    pub avatar: String,

    pub role: Role,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,
    pub nickname: String,
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, nickname, avatar, role, created_at, updated_at";

impl User {
    /// Creates a new user with role `user`
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if the username or email is
    /// already taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, nickname, role)
            VALUES ($1, $2, $3, $4, $5, 'user')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.username)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.nickname)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by exact username
    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    /// Checks whether `username` belongs to any user other than `exclude`
    pub async fn username_taken(
        pool: &PgPool,
        username: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(pool)
        .await
    }

    /// Checks whether `email` belongs to any user other than `exclude`
    pub async fn email_taken(
        pool: &PgPool,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(pool)
        .await
    }

    /// Partially updates nickname and/or avatar
    ///
    /// `None` leaves the column unchanged. Returns `None` if the user does
    /// not exist.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        nickname: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET nickname = COALESCE($2, nickname),
                avatar = COALESCE($3, avatar),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(nickname)
        .bind(avatar)
        .fetch_optional(pool)
        .await
    }

    /// Partially updates username and/or email
    ///
    /// # Errors
    ///
    /// Returns a unique-violation error if another user holds either value.
    pub async fn update_identity(
        pool: &PgPool,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(username)
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Sets a user's role
    ///
    /// Returns `false` if the user does not exist.
    pub async fn update_role(pool: &PgPool, id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(role)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users newest first, optionally filtered by a case-insensitive
    /// substring of username or email
    pub async fn list(
        pool: &PgPool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(search.map(like_pattern))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts users matching the same filter as [`User::list`]
    pub async fn count(pool: &PgPool, search: Option<&str>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
            "#,
        )
        .bind(search.map(like_pattern))
        .fetch_one(pool)
        .await
    }
}
