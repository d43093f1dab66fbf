//! Feng shui pipeline handlers
//!
//! Three steps the front-end chains together: analyze a room photo, advise
//! on it, then generate a reference image with the suggested items added.

use super::{reject_json, request_origin, AppState};
use crate::models::{
    ContentPart, GeneratedImage, ImageRequest, NormalizedRequest, ProviderConfig, ProviderType,
};
use crate::providers::{resolve_endpoint, Brand};
use crate::utils::error::helpers::bad_request;
use crate::utils::error::{AppError, AppResult, ErrorReply};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const ANALYZE_SYSTEM: &str = "你是室内空间视觉理解与方位提取专家。识别图片中的关键元素、空间布局与方位，\
仅输出 JSON：{\"elements\":[{\"name\":\"\",\"position\":\"\",\"direction\":\"\"}],\"layout\":\"\",\"orientation\":\"\"}";
const ANALYZE_PROMPT: &str =
    "请分析这张图片，提取关键元素、空间布局与方位信息，并用上述 JSON 模板输出，不要夹杂说明文字。";
const ADVISE_SYSTEM: &str = "你是专业风水顾问。根据输入元素给出风水分析与调整建议，\
仅输出 JSON：{\"analysis\":\"\",\"suggestions\":[],\"itemsToAdd\":[{\"item\":\"\",\"reason\":\"\",\"area\":\"\",\"direction\":\"\"}]}";
const GENERATE_PREFIX: &str = "在保持原图不改变风格与布局的基础上，仅添加或调整以下元素：\n";
const CHAT_PATH: &str = "/chat/completions";

/// Vendor messages meaning the reference image could not be downloaded
static DOWNLOAD_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Error while downloading|dial tcp|i/o timeout|timeout").expect("valid regex")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviseRequest {
    #[serde(default)]
    pub image_elements: Option<Value>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRefRequest {
    #[serde(default)]
    pub original_image_url: Option<String>,
    #[serde(default)]
    pub items_to_add: Vec<ItemToAdd>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

/// One suggested item from the advise step
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemToAdd {
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputResponse {
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlResponse {
    pub image_url: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require_provider(provider: Option<ProviderConfig>) -> AppResult<ProviderConfig> {
    provider.ok_or_else(|| bad_request("missing provider"))
}

fn reply(state: &AppState) -> impl Fn(AppError) -> ErrorReply + '_ {
    move |error| ErrorReply::new(error, !state.settings.is_production())
}

/// POST /fengshui/analyze-image
pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<OutputResponse>, ErrorReply> {
    run_analyze(&state, &headers, payload).await.map_err(reply(&state))
}

async fn run_analyze(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> AppResult<Json<OutputResponse>> {
    let Json(request) = payload.map_err(reject_json)?;
    let image = non_empty(request.image_url)
        .or_else(|| non_empty(request.image_data_url))
        .ok_or_else(|| bad_request("missing imageUrl or imageDataUrl"))?;
    let config = require_provider(request.provider)?;

    let origin = request_origin(headers, &state.settings);
    let resolved = state.resolver.resolve_image(&image, &config, &origin).await;

    let prompt = non_empty(request.prompt).unwrap_or_else(|| ANALYZE_PROMPT.to_string());
    let system = non_empty(request.system).unwrap_or_else(|| ANALYZE_SYSTEM.to_string());
    let normalized = NormalizedRequest::new(prompt.clone())
        .with_system(Some(system))
        .with_content_parts(vec![ContentPart::image(resolved), ContentPart::text(prompt)]);

    let provider = state.orchestrator.registry().get(&config.provider_type)?;
    let completion = provider.run(&config, &normalized).await?;
    info!("Analyze via {} produced {} chars", config.id, completion.output.len());
    Ok(Json(OutputResponse {
        output: completion.output,
    }))
}

/// POST /fengshui/advise
pub async fn advise(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AdviseRequest>, JsonRejection>,
) -> Result<Json<OutputResponse>, ErrorReply> {
    run_advise(&state, payload).await.map_err(reply(&state))
}

async fn run_advise(
    state: &AppState,
    payload: Result<Json<AdviseRequest>, JsonRejection>,
) -> AppResult<Json<OutputResponse>> {
    let Json(request) = payload.map_err(reject_json)?;
    let elements = match request.image_elements {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    }
    .ok_or_else(|| bad_request("missing imageElements"))?;
    let mut config = require_provider(request.provider)?;
    force_chat_path(&mut config);

    let prompt = non_empty(request.prompt).unwrap_or_else(|| {
        format!(
            "输入元素：\n{}\n\n请按 JSON 模板输出风水建议与应添置物品清单。",
            elements
        )
    });
    let system = non_empty(request.system).unwrap_or_else(|| ADVISE_SYSTEM.to_string());
    let normalized = NormalizedRequest::new(prompt).with_system(Some(system));

    let provider = state.orchestrator.registry().get(&config.provider_type)?;
    let completion = provider.run(&config, &normalized).await?;
    Ok(Json(OutputResponse {
        output: completion.output,
    }))
}

/// Point OpenAI-compatible configs left on the images endpoint back at chat
pub fn force_chat_path(config: &mut ProviderConfig) {
    if config.provider_type != ProviderType::OpenAICompat {
        return;
    }
    let path = config.params.path.as_deref().unwrap_or("").trim();
    if path.is_empty() || path.to_ascii_lowercase().contains("images/generations") {
        config.params.path = Some(CHAT_PATH.to_string());
    }
}

/// POST /fengshui/generate-ref
pub async fn generate_ref(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<GenerateRefRequest>, JsonRejection>,
) -> Result<Json<ImageUrlResponse>, ErrorReply> {
    run_generate(&state, &headers, payload).await.map_err(reply(&state))
}

async fn run_generate(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<Json<GenerateRefRequest>, JsonRejection>,
) -> AppResult<Json<ImageUrlResponse>> {
    let Json(request) = payload.map_err(reject_json)?;
    let original = non_empty(request.original_image_url)
        .ok_or_else(|| bad_request("missing originalImageUrl"))?;
    let config = require_provider(request.provider)?;

    if config.provider_type == ProviderType::Gemini {
        return Ok(Json(ImageUrlResponse { image_url: original }));
    }

    let prompt = non_empty(request.prompt).unwrap_or_else(|| generate_prompt(&request.items_to_add));
    let origin = request_origin(headers, &state.settings);
    let reference = state.resolver.resolve_reference(&original, &origin).await?;
    let images = if reference.starts_with("http://") || reference.starts_with("https://") {
        vec![reference]
    } else {
        Vec::new()
    };

    let provider = state.orchestrator.registry().get(&config.provider_type)?;
    let (brand, _) = resolve_endpoint(&config);
    let image_request = ImageRequest {
        prompt: prompt.clone(),
        images,
        ..Default::default()
    };

    let generated = match provider.run_images(&config, &image_request).await {
        Ok(generated) => generated,
        Err(e) if brand == Brand::Doubao && is_reference_download_failure(&e) => {
            warn!("Doubao could not download the reference image, generating without it: {}", e);
            let fallback = ImageRequest {
                prompt,
                size: Some("1024x1024".to_string()),
                response_format: Some("b64_json".to_string()),
                ..Default::default()
            };
            provider.run_images(&config, &fallback).await?
        }
        Err(e) => return Err(e),
    };

    let image_url = match generated {
        GeneratedImage::Url(url) => url,
        GeneratedImage::B64(b64) => state.resolver.store_generated(&b64, &origin).await?,
    };
    Ok(Json(ImageUrlResponse { image_url }))
}

/// Default generation prompt listing items as `item(direction/area)`
pub fn generate_prompt(items: &[ItemToAdd]) -> String {
    let listed = items
        .iter()
        .map(|i| {
            format!(
                "{}({}/{})",
                i.item,
                i.direction.as_deref().unwrap_or(""),
                i.area.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}{}", GENERATE_PREFIX, listed)
}

/// Whether a Doubao failure means the reference image was unreachable
pub fn is_reference_download_failure(error: &AppError) -> bool {
    match error {
        AppError::ProviderHttp { status, body, .. } => {
            *status == 500
                || body.contains("InternalServiceError")
                || (*status == 400 && DOWNLOAD_FAILURE.is_match(body))
        }
        other => other.to_string().contains("InternalServiceError"),
    }
}
