/// Configuration management for the API server
///
/// Loaded once at startup from environment variables (a `.env` file is read
/// first when present).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: *)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Redis connection string (default: redis://127.0.0.1:6379)
/// - `REDIS_CONNECTION_TIMEOUT_SECS`: (default: 5)
/// - `REDIS_COMMAND_TIMEOUT_SECS`: (default: 10)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `JWT_EXPIRATION_HOURS`: Session lifetime (default: 24)
/// - `UPLOAD_DIR`: Root directory for uploaded files (default: ./uploads)
/// - `PUBLIC_BASE_URL`: Base URL used to build file links (default: http://localhost:8080)
/// - `UPLOAD_MAX_BYTES`: Per-file upload limit (default: 5 MiB)
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use imagehub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use anyhow::Context;
use imagehub_shared::auth::jwt::{JwtSettings, DEFAULT_EXPIRATION_HOURS};
use imagehub_shared::cache::client::RedisConfig;
use imagehub_shared::db::pool::DatabaseConfig as PoolConfig;
use imagehub_shared::storage::uploads::{FileStore, DEFAULT_MAX_FILE_SIZE};
use serde::{Deserialize, Serialize};

/// Minimum JWT secret length in characters
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub redis: RedisSettings,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    pub connection_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub expiration_hours: i64,
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub public_base_url: String,
    pub max_bytes: usize,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` or `JWT_SECRET` is missing
    /// - `JWT_SECRET` is shorter than 32 characters
    /// - A numeric variable does not parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
        let connection_timeout_secs = parse_or(&lookup, "REDIS_CONNECTION_TIMEOUT_SECS", 5u64)?;
        let command_timeout_secs = parse_or(&lookup, "REDIS_COMMAND_TIMEOUT_SECS", 10u64)?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.chars().count() < MIN_JWT_SECRET_LENGTH {
            anyhow::bail!("JWT_SECRET must be at least {} characters long", MIN_JWT_SECRET_LENGTH);
        }
        let expiration_hours = parse_or(&lookup, "JWT_EXPIRATION_HOURS", DEFAULT_EXPIRATION_HOURS)?;
        if expiration_hours <= 0 {
            anyhow::bail!("JWT_EXPIRATION_HOURS must be positive");
        }

        let upload_dir = lookup("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string());
        let public_base_url =
            lookup("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));
        let max_bytes = parse_or(&lookup, "UPLOAD_MAX_BYTES", DEFAULT_MAX_FILE_SIZE)?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            redis: RedisSettings {
                url: redis_url,
                connection_timeout_secs,
                command_timeout_secs,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_hours,
            },
            uploads: UploadConfig {
                dir: upload_dir,
                public_base_url,
                max_bytes,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin may call the API
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            ..PoolConfig::default()
        }
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            url: self.redis.url.clone(),
            connection_timeout_secs: self.redis.connection_timeout_secs,
            command_timeout_secs: self.redis.command_timeout_secs,
        }
    }

    pub fn jwt_settings(&self) -> JwtSettings {
        JwtSettings::new(
            self.jwt.secret.clone(),
            chrono::Duration::hours(self.jwt.expiration_hours),
        )
    }

    pub fn file_store(&self) -> FileStore {
        FileStore::new(
            &self.uploads.dir,
            self.uploads.public_base_url.clone(),
            self.uploads.max_bytes,
        )
    }
}
