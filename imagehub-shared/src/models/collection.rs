/// Collection (starred image) model
///
/// One row per (user, image) pair. The image's `stars` column mirrors the
/// number of rows here; both are changed together inside one transaction.
///
/// ```sql
/// CREATE TABLE collections (
///     user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     image_id UUID NOT NULL REFERENCES images (id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (user_id, image_id)
/// );
/// ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collection {
    pub user_id: Uuid,
    pub image_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// Adds an image to a user's collection
    ///
    /// Returns `false` if the pair already existed.
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        image_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO collections (user_id, image_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, image_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(image_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes an image from a user's collection
    ///
    /// Returns `false` if the pair did not exist.
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        image_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM collections WHERE user_id = $1 AND image_id = $2")
            .bind(user_id)
            .bind(image_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes an image from every collection
    pub async fn delete_for_image<'e, E: PgExecutor<'e>>(executor: E, image_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM collections WHERE image_id = $1")
            .bind(image_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn exists(pool: &PgPool, user_id: Uuid, image_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM collections WHERE user_id = $1 AND image_id = $2)",
        )
        .bind(user_id)
        .bind(image_id)
        .fetch_one(pool)
        .await
    }

    /// Which of `image_ids` the user has collected
    pub async fn starred_among(
        pool: &PgPool,
        user_id: Uuid,
        image_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, sqlx::Error> {
        if image_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT image_id FROM collections WHERE user_id = $1 AND image_id = ANY($2)",
        )
        .bind(user_id)
        .bind(image_ids)
        .fetch_all(pool)
        .await?;

        Ok(ids.into_iter().collect())
    }
}
