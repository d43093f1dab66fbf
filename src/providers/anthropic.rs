//! Anthropic Messages API provider

use super::brand::resolve_endpoint;
use super::decode::{frame_payload, parse_json_payload, FrameParser, FrameStream};
use super::{BoxStream, Provider, ProviderContext};
use crate::models::{Completion, ContentPart, NormalizedRequest, ProviderConfig, ProviderEvent, Usage};
use crate::utils::data_url::DataUrl;
use crate::utils::error::{AppError, AppResult};
use crate::utils::url::join_url;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_PATH: &str = "/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Default, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl From<AnthropicUsage> for Usage {
    fn from(u: AnthropicUsage) -> Self {
        Usage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0))
    }
}

/// Anthropic provider
pub struct AnthropicProvider {
    context: ProviderContext,
}

impl AnthropicProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    async fn send(
        &self,
        config: &ProviderConfig,
        request: &NormalizedRequest,
        stream: bool,
    ) -> AppResult<reqwest::Response> {
        let (brand, base_url) = resolve_endpoint(config);
        let url = join_url(&base_url, config.params.path.as_deref().unwrap_or(DEFAULT_PATH));
        let (key, _) = self
            .context
            .credentials
            .resolve(brand, config.params.api_key.as_deref(), false)?;
        let body = build_messages_body(config, request, stream);
        debug!("Anthropic request to {} (stream: {})", url, stream);

        let builder = self
            .context
            .transport
            .client()
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        let policy = if stream {
            self.context.policy.stream()
        } else {
            self.context.policy.chat(brand)
        };
        self.context.transport.send(builder, &policy).await
    }
}

/// Convert content parts to Anthropic content blocks
fn content_blocks(parts: &[ContentPart]) -> Value {
    let blocks: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::ImageUrl { image_url } => match DataUrl::parse(&image_url.url) {
                Some(data) => json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": data.mime_type, "data": data.data}
                }),
                None => json!({
                    "type": "image",
                    "source": {"type": "url", "url": image_url.url}
                }),
            },
        })
        .collect();
    Value::Array(blocks)
}

/// Build a Messages API body
pub fn build_messages_body(config: &ProviderConfig, request: &NormalizedRequest, stream: bool) -> Value {
    let params = &config.params;
    let content = match &request.content_parts {
        Some(parts) => content_blocks(parts),
        None => Value::String(request.prompt.clone()),
    };

    let mut body = json!({
        "model": params.model.as_deref().unwrap_or(DEFAULT_MODEL),
        "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "temperature": params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        "messages": [{"role": "user", "content": content}],
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Decodes Messages API server-sent events
#[derive(Debug, Default)]
pub struct AnthropicFrameParser {
    input_tokens: u64,
}

impl FrameParser for AnthropicFrameParser {
    fn parse_line(&mut self, line: &str) -> AppResult<Vec<ProviderEvent>> {
        let Some(payload) = frame_payload(line) else {
            return Ok(vec![]);
        };
        if payload == "[DONE]" {
            return Ok(vec![ProviderEvent::Done]);
        }
        let Some(event) = parse_json_payload(payload) else {
            return Ok(vec![]);
        };

        let mut events = Vec::new();
        match event.get("type").and_then(Value::as_str).unwrap_or_default() {
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("stream error");
                return Err(AppError::ProviderStream(message.to_string()));
            }
            "message_start" => {
                if let Some(usage) = event.pointer("/message/usage") {
                    let usage: AnthropicUsage = serde_json::from_value(usage.clone()).unwrap_or_default();
                    self.input_tokens = usage.input_tokens.unwrap_or(0);
                    events.push(ProviderEvent::Usage(usage.into()));
                }
            }
            "message_delta" => {
                if let Some(usage) = event.get("usage") {
                    let usage: AnthropicUsage = serde_json::from_value(usage.clone()).unwrap_or_default();
                    let input = usage.input_tokens.unwrap_or(self.input_tokens);
                    events.push(ProviderEvent::Usage(Usage::new(input, usage.output_tokens.unwrap_or(0))));
                }
            }
            "message_stop" => events.push(ProviderEvent::Done),
            _ => {
                let text = event
                    .pointer("/delta/text")
                    .or_else(|| event.pointer("/content_block/text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !text.is_empty() {
                    events.push(ProviderEvent::Delta(text.to_string()));
                }
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn run(&self, config: &ProviderConfig, request: &NormalizedRequest) -> AppResult<Completion> {
        let response = self.send(config, request, false).await?;
        let message: MessagesResponse = crate::services::transport::read_json(response).await?;

        let output = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Completion {
            output,
            usage: message.usage.map(Usage::from),
        })
    }

    async fn stream(
        &self,
        config: &ProviderConfig,
        request: &NormalizedRequest,
    ) -> AppResult<BoxStream<'static, ProviderEvent>> {
        let response = self.send(config, request, true).await?;
        Ok(Box::pin(FrameStream::new(
            response.bytes_stream(),
            AnthropicFrameParser::default(),
        )))
    }
}
