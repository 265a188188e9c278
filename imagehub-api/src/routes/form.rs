/// Multipart form parsing
///
/// Text parts are collected by name (a name may repeat); file parts are
/// kept in memory as [`FileUpload`]s. Size limits are enforced by the
/// router's body limit and again by the file store.
///
/// [`MultipartForm`] is itself an extractor; a request that is not
/// `multipart/form-data` or fails to parse gets a fixed 400 message.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
};
use imagehub_shared::services::FileUpload;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, FileUpload>,
}

impl MultipartForm {
    /// Drains a multipart request
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| malformed(&e))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| malformed(&e))?;

                    // Browsers send an empty part when no file was chosen
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }

                    form.files.insert(
                        name,
                        FileUpload {
                            file_name,
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| malformed(&e))?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        }

        Ok(form)
    }

    /// Last value of a text field
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(|values| values.last().cloned())
    }

    /// Parses a numeric text field; blank counts as absent
    pub fn integer(&self, name: &str) -> ApiResult<Option<i64>> {
        match self.text(name).map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => v
                .parse()
                .map(Some)
                .map_err(|_| ApiError::BadRequest(format!("{} must be an integer", name))),
            _ => Ok(None),
        }
    }

    /// Every value of a repeatable, comma-separated list field
    pub fn list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .map(|values| values.iter().flat_map(|v| split_list(v)).collect())
            .unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<FileUpload> {
        self.files.remove(name)
    }
}

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        Self::read(multipart).await
    }
}

fn malformed(err: &axum::extract::multipart::MultipartError) -> ApiError {
    tracing::debug!(error = %err, "Rejected multipart field");
    ApiError::BadRequest("malformed multipart body".to_string())
}

/// Splits `a, b,,c` into `["a", "b", "c"]`
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
