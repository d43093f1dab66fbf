//! OpenRouter model listing
//!
//! GET /openrouter/models proxies the public model list in a reduced shape

use super::AppState;
use crate::services::transport::read_json;
use crate::utils::error::{AppError, AppResult};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct UpstreamModels {
    #[serde(default)]
    data: Vec<UpstreamModel>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
}

/// One model in the listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub context_length: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelSummary>,
}

impl From<UpstreamModel> for ModelSummary {
    fn from(m: UpstreamModel) -> Self {
        let provider = m
            .provider
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| m.id.split('/').next().unwrap_or_default().to_string());
        Self {
            name: m.name.filter(|n| !n.is_empty()).unwrap_or_else(|| m.id.clone()),
            provider,
            context_length: m.context_length.filter(|c| *c > 0),
            id: m.id,
        }
    }
}

/// GET /openrouter/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    match fetch_models(&state).await {
        Ok(list) => Json(list).into_response(),
        Err(AppError::ProviderHttp { status, body, .. }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let error = if body.is_empty() { "fetch failed".to_string() } else { body };
            (status, Json(json!({ "error": error }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn fetch_models(state: &AppState) -> AppResult<ModelList> {
    let url = &state.settings.openrouter.models_url;
    let builder = state.transport.client().get(url);
    let response = state.transport.send(builder, &state.policy.fetch()).await?;
    let upstream: UpstreamModels = read_json(response).await?;
    debug!("OpenRouter listed {} models", upstream.data.len());

    Ok(ModelList {
        data: upstream.data.into_iter().map(ModelSummary::from).collect(),
    })
}
