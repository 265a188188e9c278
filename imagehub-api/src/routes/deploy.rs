/// Deployment endpoints
///
/// - `GET /api/v1/deploy/:id?provider_id=<uuid>` - Stored configuration for an image on a provider
/// - `POST /api/v1/deploy/:id` - Save deployment parameters
/// - `GET /api/v1/providers` - Known providers

use axum::extract::State;
use imagehub_shared::models::provider::Provider;
use imagehub_shared::services::deploy::{DeployInfo, DeployParams, DeployResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{Json, Path, Query},
};

#[derive(Debug, Deserialize)]
pub struct DeployInfoParams {
    pub provider_id: Uuid,
}

/// ```json
/// { "provider_id": "<uuid>", "params": { "replicas": 2 } }
/// ```
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub provider_id: Uuid,

    #[serde(default)]
    pub params: DeployParams,
}

pub async fn get_deploy_info(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Query(params): Query<DeployInfoParams>,
) -> ApiResult<Json<DeployInfo>> {
    let info = state
        .deploy
        .get_deploy_info(image_id, params.provider_id)
        .await?;

    Ok(Json(info))
}

pub async fn deploy(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<Json<DeployResponse>> {
    let response = state
        .deploy
        .deploy(image_id, req.provider_id, req.params)
        .await?;

    Ok(Json(response))
}

pub async fn list_providers(State(state): State<AppState>) -> ApiResult<Json<Vec<Provider>>> {
    Ok(Json(state.deploy.list_providers().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_request_params_default_to_empty() {
        let req: DeployRequest =
            serde_json::from_str(r#"{"provider_id": "00000000-0000-0000-0000-000000000001"}"#).unwrap();
        assert!(req.params.is_empty());

        let req: DeployRequest = serde_json::from_str(
            r#"{"provider_id": "00000000-0000-0000-0000-000000000001", "params": {"region": "eu"}}"#,
        )
        .unwrap();
        assert_eq!(req.params["region"], "eu");
    }
}
