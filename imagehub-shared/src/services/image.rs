/// Image catalog
///
/// Listing (cache-assisted), detail, create/update/delete with label
/// reconciliation, and the collect/uncollect pair that keeps `stars` equal to
/// the number of collection rows.
///
/// # Star consistency
///
/// Collect and uncollect each run in one transaction that locks the image
/// row, changes the collection row and adjusts `stars` in SQL. The counter
/// is never written from a value read into the application.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::{check_length, non_empty, FileUpload, Page, PageRequest, ServiceError, ServiceResult};
use crate::auth::authorization::require_author;
use crate::cache::listing::{CachedPage, ListingCache};
use crate::models::collection::Collection;
use crate::models::image::{
    normalize_labels, Image, ImageChanges, ImageFilter, ImageSort, NewImage, Visibility, MAX_IDENTIFIER_LENGTH,
    MAX_PLATFORM_LENGTH, MAX_TAG_LENGTH, PUBLIC_ORG_ID,
};
use crate::models::label::{Label, MAX_LABEL_LENGTH};
use crate::models::provider::ImageProvider;
use crate::storage::uploads::{FileStore, UploadPurpose};

/// Path segment that stands for the public org
pub const PUBLIC_ORG_SEGMENT: &str = "public";

/// Image as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
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
    /// Public URL of the readme, empty when there is none
    pub readme_file: String,
    pub stars: i64,
    pub visibility: Visibility,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: Vec<String>,
    pub is_starred: bool,
}

/// Listing parameters as received from the client
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub labels: Vec<String>,
    pub sort: ImageSort,
}

impl ImageQuery {
    fn into_parts(self) -> (PageRequest, ImageFilter) {
        (
            PageRequest::clamped(self.page, self.page_size),
            ImageFilter::new(self.search, self.labels, self.sort),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateImageInput {
    pub name: String,
    pub description: Option<String>,
    pub registry: String,
    pub namespace: Option<String>,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub size: Option<i64>,
    pub visibility: String,
    pub platform: String,
    pub labels: Vec<String>,
}

/// Partial update; blank or missing fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateImageInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub registry: Option<String>,
    pub namespace: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub visibility: Option<String>,
    pub platform: Option<String>,
    /// A non-empty list replaces every existing label
    pub labels: Vec<String>,
}

/// Maps the org path segment to an org id
pub fn parse_org_id(segment: &str) -> ServiceResult<Uuid> {
    if segment == PUBLIC_ORG_SEGMENT {
        return Ok(PUBLIC_ORG_ID);
    }

    Uuid::parse_str(segment).map_err(|_| ServiceError::Validation(format!("invalid org id: {}", segment)))
}

fn parse_visibility(value: &str) -> ServiceResult<Visibility> {
    value.parse().map_err(ServiceError::Validation)
}

/// Length limit of each bounded text column
fn column_limit(field: &str) -> Option<usize> {
    match field {
        "name" | "registry" | "namespace" | "repository" | "digest" => Some(MAX_IDENTIFIER_LENGTH),
        "tag" => Some(MAX_TAG_LENGTH),
        "platform" => Some(MAX_PLATFORM_LENGTH),
        _ => None,
    }
}

/// Checks trimmed values against their column widths; `None` is skipped
fn check_columns(fields: &[(&str, Option<&str>)]) -> ServiceResult<()> {
    for (field, value) in fields {
        if let (Some(value), Some(max)) = (value, column_limit(field)) {
            check_length(field, value.trim(), max)?;
        }
    }
    Ok(())
}

/// Normalizes label names and checks each against the label column
fn checked_labels(raw: &[String]) -> ServiceResult<Vec<String>> {
    let labels = normalize_labels(raw);
    for label in &labels {
        check_length("label", label, MAX_LABEL_LENGTH)?;
    }
    Ok(labels)
}

impl CreateImageInput {
    fn check(&self) -> ServiceResult<()> {
        let required = [
            ("name", &self.name),
            ("registry", &self.registry),
            ("repository", &self.repository),
            ("tag", &self.tag),
            ("digest", &self.digest),
            ("visibility", &self.visibility),
            ("platform", &self.platform),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        if self.size.is_some_and(|s| s < 0) {
            return Err(ServiceError::Validation("size must not be negative".to_string()));
        }

        check_columns(&[
            ("name", Some(self.name.as_str())),
            ("registry", Some(self.registry.as_str())),
            ("namespace", self.namespace.as_deref()),
            ("repository", Some(self.repository.as_str())),
            ("tag", Some(self.tag.as_str())),
            ("digest", Some(self.digest.as_str())),
            ("platform", Some(self.platform.as_str())),
        ])
    }
}

impl UpdateImageInput {
    fn check(&self) -> ServiceResult<()> {
        check_columns(&[
            ("name", self.name.as_deref()),
            ("registry", self.registry.as_deref()),
            ("namespace", self.namespace.as_deref()),
            ("repository", self.repository.as_deref()),
            ("tag", self.tag.as_deref()),
            ("platform", self.platform.as_deref()),
        ])
    }
}

#[derive(Clone)]
pub struct ImageService {
    db: PgPool,
    files: FileStore,
    listing: ListingCache,
}

impl ImageService {
    pub fn new(db: PgPool, files: FileStore, listing: ListingCache) -> Self {
        Self { db, files, listing }
    }

    fn record(&self, image: Image, labels: Vec<String>, is_starred: bool) -> ImageRecord {
        ImageRecord {
            id: image.id,
            org_id: image.org_id,
            name: image.name,
            description: image.description,
            author: image.author,
            registry: image.registry,
            namespace: image.namespace,
            repository: image.repository,
            tag: image.tag,
            digest: image.digest,
            size: image.size,
            readme_file: self.files.public_url(&image.readme_file),
            stars: image.stars,
            visibility: image.visibility,
            platform: image.platform,
            created_at: image.created_at,
            updated_at: image.updated_at,
            labels,
            is_starred,
        }
    }

    async fn find(&self, id: Uuid) -> ServiceResult<Image> {
        Image::find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("image not found".to_string()))
    }

    /// One page straight from the store, starred flags unset
    async fn fetch_page(&self, filter: &ImageFilter, page: PageRequest) -> ServiceResult<Page<ImageRecord>> {
        let images = Image::list(&self.db, filter, page.limit(), page.offset()).await?;
        let total = Image::count(&self.db, filter).await?;

        let ids: Vec<Uuid> = images.iter().map(|i| i.id).collect();
        let mut labels: HashMap<Uuid, Vec<String>> = Label::names_for_images(&self.db, &ids).await?;

        let items = images
            .into_iter()
            .map(|image| {
                let names = labels.remove(&image.id).unwrap_or_default();
                self.record(image, names, false)
            })
            .collect();

        Ok(Page { items, total })
    }

    async fn mark_starred(&self, items: &mut [ImageRecord], caller: Option<Uuid>) -> ServiceResult<()> {
        let starred: HashSet<Uuid> = match caller {
            Some(user_id) if !items.is_empty() => {
                let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
                Collection::starred_among(&self.db, user_id, &ids).await?
            }
            _ => HashSet::new(),
        };

        for item in items.iter_mut() {
            item.is_starred = starred.contains(&item.id);
        }
        Ok(())
    }

    /// Lists the catalog
    ///
    /// Pages are served from the listing cache when possible. Cached pages
    /// are caller-independent and carry the total they were computed with;
    /// starred flags are filled in per caller afterwards.
    pub async fn list(&self, query: ImageQuery, caller: Option<Uuid>) -> ServiceResult<Page<ImageRecord>> {
        let (page, filter) = query.into_parts();
        let key = ListingCache::key(page.page, page.page_size, &filter);

        let mut result = match self.listing.get::<ImageRecord>(&key).await {
            Some(cached) => Page {
                items: cached.items,
                total: cached.total,
            },
            None => {
                let fresh = self.fetch_page(&filter, page).await?;
                let cached = CachedPage {
                    items: fresh.items,
                    total: fresh.total,
                };
                self.listing.put(&key, &cached).await;
                Page {
                    items: cached.items,
                    total: cached.total,
                }
            }
        };

        self.mark_starred(&mut result.items, caller).await?;
        Ok(result)
    }

    /// Images the caller collected; never cached
    pub async fn favorites(&self, query: ImageQuery, user_id: Uuid) -> ServiceResult<Page<ImageRecord>> {
        let (page, filter) = query.into_parts();
        let filter = filter.collected_by(user_id);

        let mut result = self.fetch_page(&filter, page).await?;
        for item in result.items.iter_mut() {
            item.is_starred = true;
        }
        Ok(result)
    }

    pub async fn get(&self, id: Uuid, caller: Option<Uuid>) -> ServiceResult<ImageRecord> {
        let image = self.find(id).await?;
        let labels = Label::names_for_image(&self.db, id).await?;
        let is_starred = match caller {
            Some(user_id) => Collection::exists(&self.db, user_id, id).await?,
            None => false,
        };

        Ok(self.record(image, labels, is_starred))
    }

    async fn store_readme(&self, readme: Option<FileUpload>) -> ServiceResult<Option<String>> {
        match readme {
            Some(upload) => Ok(Some(
                self.files
                    .save(
                        UploadPurpose::Readme,
                        &upload.file_name,
                        &upload.content_type,
                        upload.data,
                    )
                    .await?,
            )),
            None => Ok(None),
        }
    }

    async fn insert_with_labels(&self, data: NewImage, labels: &[String]) -> ServiceResult<Image> {
        let mut tx = self.db.begin().await?;

        let image = Image::insert(&mut *tx, data).await?;
        for name in labels {
            let label_id = Label::ensure(&mut *tx, name).await?;
            Label::attach(&mut *tx, image.id, label_id).await?;
        }

        tx.commit().await?;
        Ok(image)
    }

    /// Creates an image under `org` authored by `author`
    ///
    /// The readme is stored first and removed again if the insert fails.
    pub async fn create(
        &self,
        org: &str,
        author: Uuid,
        input: CreateImageInput,
        readme: Option<FileUpload>,
    ) -> ServiceResult<ImageRecord> {
        input.check()?;
        let org_id = parse_org_id(org)?;
        let visibility = parse_visibility(input.visibility.trim())?;
        let labels = checked_labels(&input.labels)?;

        let readme_path = self.store_readme(readme).await?;

        let data = NewImage {
            org_id,
            name: input.name.trim().to_string(),
            description: input.description.unwrap_or_default(),
            author,
            registry: input.registry.trim().to_string(),
            namespace: input.namespace.unwrap_or_default().trim().to_string(),
            repository: input.repository.trim().to_string(),
            tag: input.tag.trim().to_string(),
            digest: input.digest.trim().to_string(),
            size: input.size.unwrap_or(0),
            readme_file: readme_path.clone().unwrap_or_default(),
            visibility,
            platform: input.platform.trim().to_string(),
        };

        let image = match self.insert_with_labels(data, &labels).await {
            Ok(image) => image,
            Err(e) => {
                if let Some(path) = &readme_path {
                    self.files.delete_quietly(path).await;
                }
                return Err(e);
            }
        };

        tracing::info!(
            image_id = %image.id,
            org_id = %org_id,
            author = %author,
            labels = labels.len(),
            "Image created"
        );
        Ok(self.record(image, labels, false))
    }

    async fn apply_update(&self, id: Uuid, changes: ImageChanges, labels: &[String]) -> ServiceResult<Image> {
        let mut tx = self.db.begin().await?;

        if Image::lock(&mut *tx, id).await?.is_none() {
            return Err(ServiceError::NotFound("image not found".to_string()));
        }

        let image = Image::update(&mut *tx, id, changes)
            .await?
            .ok_or_else(|| ServiceError::NotFound("image not found".to_string()))?;

        if !labels.is_empty() {
            Label::clear_for_image(&mut *tx, id).await?;
            for name in labels {
                let label_id = Label::ensure(&mut *tx, name).await?;
                Label::attach(&mut *tx, id, label_id).await?;
            }
        }

        tx.commit().await?;
        Ok(image)
    }

    /// Partially updates an image; author only
    pub async fn update(
        &self,
        id: Uuid,
        caller: Uuid,
        input: UpdateImageInput,
        readme: Option<FileUpload>,
    ) -> ServiceResult<ImageRecord> {
        input.check()?;
        let labels = checked_labels(&input.labels)?;

        let existing = self.find(id).await?;
        require_author(caller, existing.author)?;

        let visibility = match non_empty(input.visibility) {
            Some(v) => Some(parse_visibility(&v)?),
            None => None,
        };

        let readme_path = self.store_readme(readme).await?;

        let changes = ImageChanges {
            name: non_empty(input.name),
            description: non_empty(input.description),
            registry: non_empty(input.registry),
            namespace: non_empty(input.namespace),
            repository: non_empty(input.repository),
            tag: non_empty(input.tag),
            visibility,
            platform: non_empty(input.platform),
            readme_file: readme_path.clone(),
        };

        let image = match self.apply_update(id, changes, &labels).await {
            Ok(image) => image,
            Err(e) => {
                if let Some(path) = &readme_path {
                    self.files.delete_quietly(path).await;
                }
                return Err(e);
            }
        };

        if readme_path.is_some() && !existing.readme_file.is_empty() {
            self.files.delete_quietly(&existing.readme_file).await;
        }

        let names = Label::names_for_image(&self.db, id).await?;
        let is_starred = Collection::exists(&self.db, caller, id).await?;

        tracing::info!(image_id = %id, caller_id = %caller, "Image updated");
        Ok(self.record(image, names, is_starred))
    }

    /// Deletes an image with its collections, label links and deployment
    /// parameters; author only
    pub async fn delete(&self, id: Uuid, caller: Uuid) -> ServiceResult<()> {
        let existing = self.find(id).await?;
        require_author(caller, existing.author)?;

        let mut tx = self.db.begin().await?;

        let collections = Collection::delete_for_image(&mut *tx, id).await?;
        Label::clear_for_image(&mut *tx, id).await?;
        ImageProvider::delete_for_image(&mut *tx, id).await?;
        if !Image::delete(&mut *tx, id).await? {
            return Err(ServiceError::NotFound("image not found".to_string()));
        }

        tx.commit().await?;

        self.files.delete_quietly(&existing.readme_file).await;

        tracing::info!(image_id = %id, caller_id = %caller, collections, "Image deleted");
        Ok(())
    }

    /// Adds an image to the caller's collection and bumps its star count
    pub async fn collect(&self, user_id: Uuid, image_id: Uuid) -> ServiceResult<()> {
        let mut tx = self.db.begin().await?;

        if Image::lock(&mut *tx, image_id).await?.is_none() {
            return Err(ServiceError::NotFound("image not found".to_string()));
        }
        if !Collection::insert(&mut *tx, user_id, image_id).await? {
            return Err(ServiceError::AlreadyCollected);
        }
        Image::increment_stars(&mut *tx, image_id).await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, image_id = %image_id, "Image collected");
        Ok(())
    }

    /// Removes an image from the caller's collection and drops its star count
    pub async fn uncollect(&self, user_id: Uuid, image_id: Uuid) -> ServiceResult<()> {
        let mut tx = self.db.begin().await?;

        if Image::lock(&mut *tx, image_id).await?.is_none() {
            return Err(ServiceError::NotFound("image not found".to_string()));
        }
        if !Collection::delete(&mut *tx, user_id, image_id).await? {
            return Err(ServiceError::NotInCollection);
        }
        Image::decrement_stars(&mut *tx, image_id).await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, image_id = %image_id, "Image uncollected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> CreateImageInput {
        CreateImageInput {
            name: "nginx".to_string(),
            registry: "docker.io".to_string(),
            repository: "library/nginx".to_string(),
            tag: "1.25".to_string(),
            digest: "sha256:abc".to_string(),
            visibility: "public".to_string(),
            platform: "linux/amd64".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_org_id() {
        assert_eq!(parse_org_id("public").unwrap(), PUBLIC_ORG_ID);

        let id = Uuid::new_v4();
        assert_eq!(parse_org_id(&id.to_string()).unwrap(), id);

        assert!(matches!(parse_org_id("acme"), Err(ServiceError::Validation(_))));
        assert!(matches!(parse_org_id("Public"), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_create_input_required_fields() {
        assert!(valid_input().check().is_ok());

        let input = CreateImageInput {
            tag: "  ".to_string(),
            platform: String::new(),
            ..valid_input()
        };
        let err = input.check().unwrap_err();
        assert!(matches!(&err, ServiceError::Validation(m) if m == "missing required fields: tag, platform"));
    }

    #[test]
    fn test_create_input_negative_size() {
        let input = CreateImageInput {
            size: Some(-1),
            ..valid_input()
        };
        assert!(matches!(input.check(), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_create_input_column_widths() {
        let at_limit = CreateImageInput {
            name: "n".repeat(255),
            namespace: Some("s".repeat(255)),
            digest: "d".repeat(255),
            tag: "t".repeat(128),
            platform: "p".repeat(64),
            ..valid_input()
        };
        assert!(at_limit.check().is_ok());

        let cases = [
            ("name", CreateImageInput { name: "n".repeat(256), ..valid_input() }),
            ("registry", CreateImageInput { registry: "r".repeat(256), ..valid_input() }),
            ("namespace", CreateImageInput { namespace: Some("s".repeat(256)), ..valid_input() }),
            ("repository", CreateImageInput { repository: "r".repeat(256), ..valid_input() }),
            ("digest", CreateImageInput { digest: "d".repeat(256), ..valid_input() }),
            ("tag", CreateImageInput { tag: "t".repeat(129), ..valid_input() }),
            ("platform", CreateImageInput { platform: "p".repeat(65), ..valid_input() }),
        ];
        for (field, input) in cases {
            let err = input.check().unwrap_err();
            assert!(
                matches!(&err, ServiceError::Validation(m) if m.starts_with(&format!("{} must be at most", field))),
                "{field}: {err:?}"
            );
        }
    }

    #[test]
    fn test_update_input_column_widths() {
        assert!(UpdateImageInput::default().check().is_ok());
        assert!(UpdateImageInput {
            tag: Some("t".repeat(128)),
            ..Default::default()
        }
        .check()
        .is_ok());

        let err = UpdateImageInput {
            platform: Some("p".repeat(65)),
            ..Default::default()
        }
        .check()
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(m) if m == "platform must be at most 64 characters"));

        let err = UpdateImageInput {
            name: Some("n".repeat(256)),
            ..Default::default()
        }
        .check()
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(m) if m == "name must be at most 255 characters"));
    }

    #[test]
    fn test_label_width() {
        let ok = checked_labels(&[" web ".to_string(), "l".repeat(100)]).unwrap();
        assert_eq!(ok, vec!["l".repeat(100), "web".to_string()]);

        let err = checked_labels(&["l".repeat(101)]).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(m) if m == "label must be at most 100 characters"));
    }

    #[test]
    fn test_parse_visibility() {
        assert_eq!(parse_visibility("private").unwrap(), Visibility::Private);
        assert!(matches!(parse_visibility("hidden"), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_query_normalization() {
        let query = ImageQuery {
            page: Some(0),
            page_size: Some(1000),
            search: Some("  ".to_string()),
            labels: vec!["web".to_string(), " web".to_string(), "db".to_string()],
            sort: ImageSort::Stars,
        };

        let (page, filter) = query.into_parts();
        assert_eq!(page, PageRequest { page: 1, page_size: 100 });
        assert!(filter.search.is_none());
        assert_eq!(filter.labels, vec!["db", "web"]);
        assert_eq!(filter.sort, ImageSort::Stars);
    }

    #[test]
    fn test_record_serialization_round_trips_through_cache_shape() {
        let record = ImageRecord {
            id: Uuid::new_v4(),
            org_id: PUBLIC_ORG_ID,
            name: "redis".to_string(),
            description: String::new(),
            author: Uuid::new_v4(),
            registry: "docker.io".to_string(),
            namespace: String::new(),
            repository: "library/redis".to_string(),
            tag: "7".to_string(),
            digest: "sha256:def".to_string(),
            size: 1024,
            readme_file: String::new(),
            stars: 3,
            visibility: Visibility::Public,
            platform: "linux/arm64".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            labels: vec!["cache".to_string()],
            is_starred: false,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["visibility"], "public");
        assert_eq!(json["labels"][0], "cache");

        let back: ImageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
