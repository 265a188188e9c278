/// Local upload storage for avatars and readme files
///
/// Files are kept under one directory per [`UploadPurpose`] and referred to
/// by their path relative to the storage root. Paths handed back for
/// deletion must stay inside the root.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Default upper bound for a single upload (5 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 << 20;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file size exceeds maximum limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("file storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the error was caused by the uploaded file rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::TooLarge { .. } | StorageError::UnsupportedType(_)
        )
    }
}

/// What an upload is for; decides directory and accepted content types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPurpose {
    Avatar,
    Readme,
}

impl UploadPurpose {
    pub fn dir(&self) -> &'static str {
        match self {
            UploadPurpose::Avatar => "avatars",
            UploadPurpose::Readme => "readme",
        }
    }

    fn allowed_types(&self) -> &'static [&'static str] {
        match self {
            UploadPurpose::Avatar => &["image/jpeg", "image/png", "image/gif"],
            UploadPurpose::Readme => &[
                "text/markdown",
                "text/x-markdown",
                "text/plain",
                "application/octet-stream",
            ],
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_types().contains(&essence.as_str())
    }
}

/// Files stored under a local root and served from `<base_url>/uploads/`
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    base_url: String,
    max_file_size: usize,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validates and writes an upload
    ///
    /// The file lands at `<root>/<purpose dir>/<YYYYMMDD>_<uuid><ext>`, where
    /// `ext` is taken from the client's file name. Returns the path relative
    /// to the root, which is what gets stored in the database.
    pub async fn save(
        &self,
        purpose: UploadPurpose,
        original_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<String, StorageError> {
        if data.len() > self.max_file_size {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: self.max_file_size,
            });
        }

        if !purpose.accepts(content_type) {
            return Err(StorageError::UnsupportedType(content_type.to_string()));
        }

        let dir = self.root.join(purpose.dir());
        fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "{}_{}{}",
            Utc::now().format("%Y%m%d"),
            Uuid::new_v4(),
            extension_of(original_name)
        );

        let mut file = fs::File::create(dir.join(&file_name)).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        let relative = format!("{}/{}", purpose.dir(), file_name);
        tracing::debug!(path = %relative, bytes = data.len(), "Stored upload");
        Ok(relative)
    }

    /// Removes a stored file
    ///
    /// Empty paths, external `http(s)://` references and already-missing
    /// files are no-ops.
    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        if path.is_empty() || is_external(path) {
            return Ok(());
        }

        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        match fs::remove_file(self.root.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a file and only logs failures
    pub async fn delete_quietly(&self, path: &str) {
        if let Err(e) = self.delete(path).await {
            tracing::warn!(path, error = %e, "Failed to delete stored file");
        }
    }

    /// Public URL for a stored path; empty stays empty, external URLs pass through
    pub fn public_url(&self, path: &str) -> String {
        if path.is_empty() || is_external(path) {
            return path.to_string();
        }
        format!("{}/uploads/{}", self.base_url, path)
    }
}

fn is_external(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// `.ext` from a client file name, restricted to short alphanumeric suffixes
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}
