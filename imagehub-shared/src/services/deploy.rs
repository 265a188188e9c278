/// Deployment configuration lookup
///
/// Stores per-(image, provider) parameters as JSON text and hands them back
/// together with the provider's API endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::models::image::Image;
use crate::models::provider::{ImageProvider, Provider};

pub type DeployParams = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInfo {
    pub provider_name: String,
    pub api_url: String,
    pub params: DeployParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub image_id: Uuid,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub params: DeployParams,
}

#[derive(Clone)]
pub struct DeployService {
    db: PgPool,
}

/// Decodes stored parameter text; empty text is an empty object
fn decode_params(raw: &str) -> ServiceResult<DeployParams> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    serde_json::from_str(raw).map_err(|e| {
        ServiceError::Internal(format!("stored deployment parameters are not a JSON object: {}", e))
    })
}

impl DeployService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn provider(&self, provider_id: Uuid) -> ServiceResult<Provider> {
        Provider::find_by_id(&self.db, provider_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("provider not found".to_string()))
    }

    pub async fn get_deploy_info(&self, image_id: Uuid, provider_id: Uuid) -> ServiceResult<DeployInfo> {
        let config = ImageProvider::find(&self.db, image_id, provider_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("deployment configuration not found".to_string()))?;
        let provider = self.provider(provider_id).await?;

        Ok(DeployInfo {
            provider_name: provider.name,
            api_url: provider.api_url,
            params: decode_params(&config.params)?,
        })
    }

    /// Saves (or replaces) the parameters for an image on a provider
    pub async fn deploy(
        &self,
        image_id: Uuid,
        provider_id: Uuid,
        params: DeployParams,
    ) -> ServiceResult<DeployResponse> {
        if Image::find_by_id(&self.db, image_id).await?.is_none() {
            return Err(ServiceError::NotFound("image not found".to_string()));
        }
        let provider = self.provider(provider_id).await?;

        let encoded = serde_json::to_string(&params)
            .map_err(|e| ServiceError::Internal(format!("failed to encode parameters: {}", e)))?;
        ImageProvider::upsert(&self.db, image_id, provider_id, &encoded).await?;

        tracing::info!(
            image_id = %image_id,
            provider_id = %provider_id,
            provider = %provider.name,
            "Deployment parameters saved"
        );

        Ok(DeployResponse {
            image_id,
            provider_id,
            provider_name: provider.name,
            params,
        })
    }

    pub async fn list_providers(&self) -> ServiceResult<Vec<Provider>> {
        Ok(Provider::list(&self.db).await?)
    }
}
