/// Label model
///
/// Labels are created on first use and never deleted; deleting an image only
/// removes its `image_labels` links.
///
/// ```sql
/// CREATE TABLE labels (
///     id UUID PRIMARY KEY,
///     name VARCHAR(100) NOT NULL UNIQUE
/// );
///
/// CREATE TABLE image_labels (
///     image_id UUID NOT NULL REFERENCES images (id) ON DELETE CASCADE,
///     label_id UUID NOT NULL REFERENCES labels (id) ON DELETE CASCADE,
///     PRIMARY KEY (image_id, label_id)
/// );
/// ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Width of `labels.name`
pub const MAX_LABEL_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
}

impl Label {
    /// Returns the id of the label called `name`, creating it if needed
    ///
    /// A single upsert against the `UNIQUE (name)` constraint, so two
    /// transactions ensuring the same name concurrently both get the same id.
    pub async fn ensure<'e, E: PgExecutor<'e>>(executor: E, name: &str) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO labels (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(executor)
        .await
    }

    /// Links a label to an image; linking twice is a no-op
    pub async fn attach<'e, E: PgExecutor<'e>>(
        executor: E,
        image_id: Uuid,
        label_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO image_labels (image_id, label_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(image_id)
        .bind(label_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Removes every label link of an image
    pub async fn clear_for_image<'e, E: PgExecutor<'e>>(executor: E, image_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM image_labels WHERE image_id = $1")
            .bind(image_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Label names of one image, alphabetically
    pub async fn names_for_image<'e, E: PgExecutor<'e>>(
        executor: E,
        image_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT l.name
            FROM image_labels il
            JOIN labels l ON l.id = il.label_id
            WHERE il.image_id = $1
            ORDER BY l.name
            "#,
        )
        .bind(image_id)
        .fetch_all(executor)
        .await
    }

    /// Label names for a batch of images, keyed by image id
    ///
    /// Images without labels are absent from the map.
    pub async fn names_for_images(
        pool: &PgPool,
        image_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>, sqlx::Error> {
        if image_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT il.image_id, l.name
            FROM image_labels il
            JOIN labels l ON l.id = il.label_id
            WHERE il.image_id = ANY($1)
            ORDER BY l.name
            "#,
        )
        .bind(image_ids)
        .fetch_all(pool)
        .await?;

        let mut map: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (image_id, name) in rows {
            map.entry(image_id).or_default().push(name);
        }
        Ok(map)
    }
}
