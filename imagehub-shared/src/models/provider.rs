/// Deployment providers and per-image deployment parameters
///
/// ```sql
/// CREATE TABLE providers (
///     id UUID PRIMARY KEY,
///     name VARCHAR(100) NOT NULL UNIQUE,
///     api_url TEXT NOT NULL
/// );
///
/// CREATE TABLE image_providers (
///     image_id UUID NOT NULL REFERENCES images (id) ON DELETE CASCADE,
///     provider_id UUID NOT NULL REFERENCES providers (id) ON DELETE CASCADE,
///     params TEXT NOT NULL DEFAULT '',
///     PRIMARY KEY (image_id, provider_id)
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// A deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub api_url: String,
}

impl Provider {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>("SELECT id, name, api_url FROM providers WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>("SELECT id, name, api_url FROM providers ORDER BY name")
            .fetch_all(pool)
            .await
    }
}

/// Stored deployment parameters for an (image, provider) pair
///
/// `params` holds a JSON object encoded as text; empty text means no
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageProvider {
    pub image_id: Uuid,
    pub provider_id: Uuid,
    pub params: String,
}

impl ImageProvider {
    pub async fn find(
        pool: &PgPool,
        image_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ImageProvider>(
            r#"
            SELECT image_id, provider_id, params
            FROM image_providers
            WHERE image_id = $1 AND provider_id = $2
            "#,
        )
        .bind(image_id)
        .bind(provider_id)
        .fetch_optional(pool)
        .await
    }

    /// Inserts or replaces the parameters for a pair
    pub async fn upsert(
        pool: &PgPool,
        image_id: Uuid,
        provider_id: Uuid,
        params: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ImageProvider>(
            r#"
            INSERT INTO image_providers (image_id, provider_id, params)
            VALUES ($1, $2, $3)
            ON CONFLICT (image_id, provider_id) DO UPDATE SET params = EXCLUDED.params
            RETURNING image_id, provider_id, params
            "#,
        )
        .bind(image_id)
        .bind(provider_id)
        .bind(params)
        .fetch_one(pool)
        .await
    }

    /// Removes all deployment parameters of an image
    pub async fn delete_for_image<'e, E: PgExecutor<'e>>(executor: E, image_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM image_providers WHERE image_id = $1")
            .bind(image_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
