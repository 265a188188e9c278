/// Image catalog model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TYPE image_visibility AS ENUM ('public', 'private');
///
/// CREATE TABLE images (
///     id UUID PRIMARY KEY,
///     org_id UUID NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     author UUID NOT NULL REFERENCES users (id),
///     registry VARCHAR(255) NOT NULL,
///     namespace VARCHAR(255) NOT NULL DEFAULT '',
///     repository VARCHAR(255) NOT NULL,
///     tag VARCHAR(128) NOT NULL,
///     digest VARCHAR(255) NOT NULL,
///     size BIGINT NOT NULL DEFAULT 0,
///     readme_file TEXT NOT NULL DEFAULT '',
///     stars BIGINT NOT NULL DEFAULT 0 CHECK (stars >= 0),
///     visibility image_visibility NOT NULL DEFAULT 'public',
///     platform VARCHAR(64) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Star counter
///
/// `stars` is only ever changed with in-database arithmetic
/// ([`Image::increment_stars`], [`Image::decrement_stars`]) while the row is
/// locked with [`Image::lock`], in the same transaction that inserts or
/// deletes the matching `collections` row.
///
/// # Example
///
/// ```no_run
/// use imagehub_shared::models::image::{Image, ImageFilter, ImageSort};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let filter = ImageFilter::new(
///     Some("nginx".to_string()),
///     vec!["web".to_string(), "proxy".to_string()],
///     ImageSort::Stars,
/// );
///
/// let page = Image::list(&pool, &filter, 10, 0).await?;
/// let total = Image::count(&pool, &filter).await?;
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::like_pattern;

/// Org id that the `public` path segment maps to
pub const PUBLIC_ORG_ID: Uuid = Uuid::nil();

/// Width of `name`, `registry`, `namespace`, `repository` and `digest`
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Width of `tag`
pub const MAX_TAG_LENGTH: usize = 128;

/// Width of `platform`
pub const MAX_PLATFORM_LENGTH: usize = 64;

/// Image visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "image_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("invalid visibility: {}", other)),
        }
    }
}

/// Listing sort key; always applied descending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSort {
    Stars,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl ImageSort {
    /// Parses a client-supplied sort key, falling back to `created_at`
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSort::Stars => "stars",
            ImageSort::CreatedAt => "created_at",
            ImageSort::UpdatedAt => "updated_at",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            ImageSort::Stars => "i.stars",
            ImageSort::CreatedAt => "i.created_at",
            ImageSort::UpdatedAt => "i.updated_at",
        }
    }
}

impl fmt::Display for ImageSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stars" => Ok(ImageSort::Stars),
            "created_at" => Ok(ImageSort::CreatedAt),
            "updated_at" => Ok(ImageSort::UpdatedAt),
            _ => Err(()),
        }
    }
}

/// Image row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: String,
    /// Author's user id
    pub author: Uuid,
    pub registry: String,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    /// Size in bytes
    pub size: i64,
    /// Stored readme path relative to the uploads root, empty when unset
    pub readme_file: String,
    pub stars: i64,
    pub visibility: Visibility,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting an image
#[derive(Debug, Clone)]
pub struct NewImage {
    pub org_id: Uuid,
    pub name: String,
    pub description: String,
    pub author: Uuid,
    pub registry: String,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub size: i64,
    pub readme_file: String,
    pub visibility: Visibility,
    pub platform: String,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct ImageChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub registry: Option<String>,
    pub namespace: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub visibility: Option<Visibility>,
    pub platform: Option<String>,
    pub readme_file: Option<String>,
}

/// Listing filter shared by the catalog and favorites queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilter {
    /// Case-insensitive substring of name or description
    pub search: Option<String>,

    /// Required labels (all must be present); sorted and de-duplicated
    pub labels: Vec<String>,

    pub sort: ImageSort,

    /// Restrict to images collected by this user
    pub collected_by: Option<Uuid>,
}

impl ImageFilter {
    /// Builds a filter, dropping blank search terms and normalizing labels
    pub fn new(search: Option<String>, labels: Vec<String>, sort: ImageSort) -> Self {
        Self {
            search: search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            labels: normalize_labels(labels),
            sort,
            collected_by: None,
        }
    }

    /// Restricts the filter to one user's collection
    pub fn collected_by(mut self, user_id: Uuid) -> Self {
        self.collected_by = Some(user_id);
        self
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");

        if let Some(user_id) = self.collected_by {
            qb.push(" AND i.id IN (SELECT c.image_id FROM collections c WHERE c.user_id = ")
                .push_bind(user_id)
                .push(")");
        }

        if let Some(search) = &self.search {
            let pattern = like_pattern(search);
            qb.push(" AND (i.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR i.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if !self.labels.is_empty() {
            // Label intersection: the image must match every requested name
            qb.push(
                " AND i.id IN (SELECT il.image_id FROM image_labels il \
                 JOIN labels l ON l.id = il.label_id WHERE l.name = ANY(",
            )
            .push_bind(self.labels.clone())
            .push(") GROUP BY il.image_id HAVING COUNT(DISTINCT l.id) = ")
            .push_bind(self.labels.len() as i64)
            .push(")");
        }
    }
}

/// Trims, drops empties, sorts and de-duplicates label names
pub fn normalize_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = labels
        .into_iter()
        .map(|l| l.as_ref().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

const IMAGE_COLUMNS: &str = "i.id, i.org_id, i.name, i.description, i.author, i.registry, \
     i.namespace, i.repository, i.tag, i.digest, i.size, i.readme_file, i.stars, \
     i.visibility, i.platform, i.created_at, i.updated_at";

impl Image {
    /// Inserts a new image with zero stars
    pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, data: NewImage) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Image>(&format!(
            r#"
            INSERT INTO images AS i (id, org_id, name, description, author, registry, namespace,
                                     repository, tag, digest, size, readme_file, stars,
                                     visibility, platform)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13, $14)
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.org_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.author)
        .bind(data.registry)
        .bind(data.namespace)
        .bind(data.repository)
        .bind(data.tag)
        .bind(data.digest)
        .bind(data.size)
        .bind(data.readme_file)
        .bind(data.visibility)
        .bind(data.platform)
        .fetch_one(executor)
        .await
    }

    /// Finds an image by ID
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Image>(&format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds an image and takes a row lock for the rest of the transaction
    pub async fn lock<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images i WHERE i.id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Applies a partial update and refreshes `updated_at`
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        changes: ImageChanges,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Image>(&format!(
            r#"
            UPDATE images AS i
            SET name = COALESCE($2, i.name),
                description = COALESCE($3, i.description),
                registry = COALESCE($4, i.registry),
                namespace = COALESCE($5, i.namespace),
                repository = COALESCE($6, i.repository),
                tag = COALESCE($7, i.tag),
                visibility = COALESCE($8, i.visibility),
                platform = COALESCE($9, i.platform),
                readme_file = COALESCE($10, i.readme_file),
                updated_at = NOW()
            WHERE i.id = $1
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.registry)
        .bind(changes.namespace)
        .bind(changes.repository)
        .bind(changes.tag)
        .bind(changes.visibility)
        .bind(changes.platform)
        .bind(changes.readme_file)
        .fetch_optional(executor)
        .await
    }

    /// Deletes the image row
    ///
    /// Returns `false` if no row was deleted.
    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// `stars = stars + 1`
    pub async fn increment_stars<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE images SET stars = stars + 1 WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// `stars = stars - 1`, floored at zero
    pub async fn decrement_stars<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE images SET stars = GREATEST(stars - 1, 0) WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Lists one page of images matching `filter`
    ///
    /// Ordered by the filter's sort column descending, then by id so pages
    /// never overlap on ties.
    pub async fn list(
        pool: &PgPool,
        filter: &ImageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {IMAGE_COLUMNS} FROM images i"));
        filter.push_where(&mut qb);
        qb.push(format!(" ORDER BY {} DESC, i.id DESC", filter.sort.column()));
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        qb.build_query_as::<Image>().fetch_all(pool).await
    }

    /// Counts images matching `filter`
    pub async fn count(pool: &PgPool, filter: &ImageFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM images i");
        filter.push_where(&mut qb);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parse() {
        assert_eq!(ImageSort::parse_or_default(Some("stars")), ImageSort::Stars);
        assert_eq!(ImageSort::parse_or_default(Some("updated_at")), ImageSort::UpdatedAt);
        assert_eq!(ImageSort::parse_or_default(Some("created_at")), ImageSort::CreatedAt);
        assert_eq!(ImageSort::parse_or_default(Some("name")), ImageSort::CreatedAt);
        assert_eq!(ImageSort::parse_or_default(None), ImageSort::CreatedAt);
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert_eq!("private".parse::<Visibility>(), Ok(Visibility::Private));
        assert!("internal".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_normalize_labels() {
        let labels = normalize_labels(vec![" web ", "db", "", "web", "cache"]);
        assert_eq!(labels, vec!["cache", "db", "web"]);
    }

    #[test]
    fn test_filter_drops_blank_search() {
        let filter = ImageFilter::new(Some("   ".to_string()), vec![], ImageSort::Stars);
        assert!(filter.search.is_none());

        let filter = ImageFilter::new(Some(" redis ".to_string()), vec![], ImageSort::Stars);
        assert_eq!(filter.search.as_deref(), Some("redis"));
    }

    #[test]
    fn test_filter_sql_shape() {
        let user_id = Uuid::new_v4();
        let filter = ImageFilter::new(
            Some("nginx".to_string()),
            vec!["web".to_string(), "proxy".to_string()],
            ImageSort::Stars,
        )
        .collected_by(user_id);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM images i");
        filter.push_where(&mut qb);
        let sql = qb.sql();

        assert!(sql.contains("c.user_id = $1"));
        assert!(sql.contains("i.name ILIKE $2 OR i.description ILIKE $3"));
        assert!(sql.contains("l.name = ANY($4)"));
        assert!(sql.contains("HAVING COUNT(DISTINCT l.id) = $5"));
    }

    #[test]
    fn test_unfiltered_sql_has_no_conditions() {
        let filter = ImageFilter::default();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM images i");
        filter.push_where(&mut qb);

        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM images i WHERE TRUE");
    }

    #[test]
    fn test_public_org_is_nil() {
        assert_eq!(PUBLIC_ORG_ID.to_string(), "00000000-0000-0000-0000-000000000000");
    }
}
