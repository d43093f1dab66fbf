//! Upload handler
//!
//! POST /upload stores a base64 image and returns where it can be fetched

use super::{reject_json, request_origin, AppState};
use crate::utils::data_url::DataUrl;
use crate::utils::error::helpers::bad_request;
use crate::utils::error::AppResult;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Hosted URL when available, otherwise the local one
    pub url: String,
    pub local_url: String,
    pub hosted: bool,
    pub host: String,
}

/// POST /upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> AppResult<Json<UploadResponse>> {
    let Json(request) = payload.map_err(reject_json)?;
    let data_url = request
        .data_url
        .filter(|d| !d.is_empty())
        .ok_or_else(|| bad_request("missing dataUrl"))?;
    let data = DataUrl::parse(&data_url)
        .ok_or_else(|| bad_request("dataUrl must be a base64 data URL"))?;

    let origin = request_origin(&headers, &state.settings);
    let (name, local_url, hosted) = state
        .resolver
        .store_upload(&data, request.filename.as_deref(), &origin)
        .await?;
    info!("Stored upload {} ({})", name, data.mime_type);

    Ok(Json(UploadResponse {
        url: hosted.clone().unwrap_or_else(|| local_url.clone()),
        local_url,
        hosted: hosted.is_some(),
        host: state.resolver.image_host().name().to_string(),
    }))
}
