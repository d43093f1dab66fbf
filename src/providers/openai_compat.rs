//! OpenAI-compatible provider implementation
//!
//! Serves every vendor that speaks the chat completions protocol (OpenAI,
//! DeepSeek, Qianwen, Doubao, OpenRouter, Azure and self-hosted endpoints)
//! plus the images generations endpoint.

use super::brand::{resolve_endpoint, Brand};
use super::decode::{frame_payload, parse_json_payload, FrameParser, FrameStream};
use super::{BoxStream, Provider, ProviderContext};
use crate::models::{
    Completion, ContentPart, GeneratedImage, ImageRequest, NormalizedRequest, ProviderConfig,
    ProviderEvent, Usage,
};
use crate::utils::error::helpers::decode_error;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::create_request_log_summary;
use crate::utils::url::join_url;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_PATH: &str = "/chat/completions";
const IMAGES_PATH: &str = "/images/generations";
const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// OpenAI-compatible chat completion response or stream chunk
#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    delta: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage::with_total(
            u.prompt_tokens.unwrap_or(0),
            u.completion_tokens.unwrap_or(0),
            u.total_tokens,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

/// OpenAI-compatible provider
pub struct OpenAICompatProvider {
    context: ProviderContext,
}

impl OpenAICompatProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    /// Resolve brand, URL and key for a chat call
    fn prepare(&self, config: &ProviderConfig) -> AppResult<(Brand, String, String)> {
        let (brand, base_url) = resolve_endpoint(config);
        let path = config.params.path.as_deref().unwrap_or(DEFAULT_PATH);
        let url = join_url(&base_url, path);
        let (key, source) = self
            .context
            .credentials
            .resolve(brand, config.params.api_key.as_deref(), true)?;
        debug!("Provider {} resolved to {} ({:?} key) at {}", config.id, brand, source, url);
        Ok((brand, url, key))
    }
}

/// Build the user message content, flattening image parts for brands that want bare URLs
pub fn build_user_content(request: &NormalizedRequest, brand: Brand) -> Value {
    let Some(parts) = &request.content_parts else {
        return Value::String(request.prompt.clone());
    };

    let parts: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::ImageUrl { image_url } if brand.flattens_image_urls() => {
                json!({"type": "image_url", "image_url": image_url.url})
            }
            ContentPart::ImageUrl { image_url } => {
                json!({"type": "image_url", "image_url": {"url": image_url.url}})
            }
        })
        .collect();
    Value::Array(parts)
}

/// Build a chat completions body
///
/// Only model and messages are sent; sampling parameters are left to the
/// vendor defaults since several compatible vendors reject unknown values.
pub fn build_chat_body(config: &ProviderConfig, request: &NormalizedRequest, brand: Brand, stream: bool) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": build_user_content(request, brand)}));

    let mut body = json!({ "messages": messages });
    if let Some(model) = &config.params.model {
        body["model"] = json!(model);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Build an images generations body
pub fn build_images_body(config: &ProviderConfig, request: &ImageRequest, brand: Brand) -> Value {
    let params = &config.params;
    let model = request
        .model
        .as_deref()
        .or(params.model.as_deref())
        .unwrap_or(DEFAULT_IMAGE_MODEL);
    let size = request
        .size
        .as_deref()
        .or(params.size.as_deref())
        .unwrap_or(DEFAULT_IMAGE_SIZE);
    let size = if brand == Brand::Doubao && size == DEFAULT_IMAGE_SIZE { "2K" } else { size };
    let default_format = if brand == Brand::Doubao { "url" } else { "b64_json" };
    let response_format = request
        .response_format
        .as_deref()
        .or(params.response_format.as_deref())
        .unwrap_or(default_format);

    let mut body = json!({
        "prompt": request.prompt,
        "model": model,
        "size": size,
        "response_format": response_format,
    });

    if brand == Brand::Doubao {
        if !request.images.is_empty() {
            body["image"] = json!(request.images);
        }
        if let Some(seed) = params.seed {
            body["seed"] = json!(seed);
        }
        if let Some(scale) = params.guidance_scale {
            body["guidance_scale"] = json!(scale);
        }
        if let Some(negative) = &params.negative_prompt {
            body["negative_prompt"] = json!(negative);
        }
    }
    body
}

/// Decodes `data: {chunk}` frames terminated by `data: [DONE]`
#[derive(Debug, Default)]
pub struct OpenAIFrameParser;

impl FrameParser for OpenAIFrameParser {
    fn parse_line(&mut self, line: &str) -> AppResult<Vec<ProviderEvent>> {
        let Some(payload) = frame_payload(line) else {
            return Ok(vec![]);
        };
        if payload == "[DONE]" {
            return Ok(vec![ProviderEvent::Done]);
        }
        let Some(value) = parse_json_payload(payload) else {
            return Ok(vec![]);
        };
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(AppError::ProviderStream(message));
        }

        let chunk: ChatResponse = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Skipping unexpected chunk shape: {}", e);
                return Ok(vec![]);
            }
        };

        let mut events = Vec::new();
        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.or(c.message))
            .and_then(|m| m.content)
            .unwrap_or_default();
        if !text.is_empty() {
            events.push(ProviderEvent::Delta(text));
        }
        if let Some(usage) = chunk.usage {
            events.push(ProviderEvent::Usage(usage.into()));
        }
        Ok(events)
    }
}

#[async_trait]
impl Provider for OpenAICompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn run(&self, config: &ProviderConfig, request: &NormalizedRequest) -> AppResult<Completion> {
        let (brand, url, key) = self.prepare(config)?;
        let body = build_chat_body(config, request, brand, false);
        debug!("OpenAI-compatible request: {}", create_request_log_summary(request));

        let builder = self.context.transport.client().post(&url).bearer_auth(&key).json(&body);
        let response: ChatResponse = self
            .context
            .transport
            .send_json(builder, &self.context.policy.chat(brand))
            .await?;

        let output = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        Ok(Completion {
            output,
            usage: response.usage.map(Usage::from),
        })
    }

    async fn stream(
        &self,
        config: &ProviderConfig,
        request: &NormalizedRequest,
    ) -> AppResult<BoxStream<'static, ProviderEvent>> {
        let (brand, url, key) = self.prepare(config)?;
        let body = build_chat_body(config, request, brand, true);

        let builder = self
            .context
            .transport
            .client()
            .post(&url)
            .bearer_auth(&key)
            .header("Accept", "text/event-stream")
            .json(&body);
        let response = self.context.transport.send(builder, &self.context.policy.stream()).await?;

        Ok(Box::pin(FrameStream::new(response.bytes_stream(), OpenAIFrameParser)))
    }

    async fn run_images(&self, config: &ProviderConfig, request: &ImageRequest) -> AppResult<GeneratedImage> {
        let (brand, base_url) = resolve_endpoint(config);
        let url = join_url(&base_url, IMAGES_PATH);
        let (key, _) = self
            .context
            .credentials
            .resolve(brand, config.params.api_key.as_deref(), true)?;
        let body = build_images_body(config, request, brand);
        debug!(
            "Image generation via {} with {} reference image(s)",
            brand,
            request.images.len()
        );

        let builder = self.context.transport.client().post(&url).bearer_auth(&key).json(&body);
        let response: ImagesResponse = self
            .context
            .transport
            .send_json(builder, &self.context.policy.images(brand))
            .await?;

        let first = response.data.into_iter().next().unwrap_or_default();
        match (first.url, first.b64_json) {
            (Some(url), _) if !url.is_empty() => Ok(GeneratedImage::Url(url)),
            (_, Some(b64)) if !b64.is_empty() => Ok(GeneratedImage::B64(b64)),
            _ => Err(decode_error(format!("No image returned by {}", url))),
        }
    }
}
