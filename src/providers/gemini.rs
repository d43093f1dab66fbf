//! Google Gemini provider

use super::brand::resolve_endpoint;
use super::decode::{frame_payload, parse_json_payload, FrameParser, FrameStream};
use super::{BoxStream, Provider, ProviderContext};
use crate::models::{Completion, ContentPart, NormalizedRequest, ProviderConfig, ProviderEvent, Usage};
use crate::utils::data_url::DataUrl;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
    #[serde(default)]
    total_token_count: Option<u64>,
}

impl From<UsageMetadata> for Usage {
    fn from(u: UsageMetadata) -> Self {
        Usage::with_total(
            u.prompt_token_count.unwrap_or(0),
            u.candidates_token_count.unwrap_or(0),
            u.total_token_count,
        )
    }
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

/// Gemini provider
pub struct GeminiProvider {
    context: ProviderContext,
}

impl GeminiProvider {
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
        let model = config.params.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let method = if stream { "streamGenerateContent" } else { "generateContent" };
        let url = format!("{}/models/{}:{}", base_url, model, method);
        let (key, _) = self
            .context
            .credentials
            .resolve(brand, config.params.api_key.as_deref(), false)?;
        debug!("Gemini request to {} (stream: {})", url, stream);

        let mut builder = self.context.transport.client().post(&url);
        if stream {
            builder = builder.query(&[("alt", "sse")]);
        }
        let builder = builder
            .query(&[("key", key.as_str())])
            .json(&build_generate_body(config, request));
        let policy = if stream {
            self.context.policy.stream()
        } else {
            self.context.policy.chat(brand)
        };
        self.context.transport.send(builder, &policy).await
    }
}

fn content_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({"text": text}),
        ContentPart::ImageUrl { image_url } => match DataUrl::parse(&image_url.url) {
            Some(data) => json!({"inline_data": {"mime_type": data.mime_type, "data": data.data}}),
            None => json!({"text": format!("Image URL: {}", image_url.url)}),
        },
    }
}

/// Build a generateContent body
///
/// The system prompt travels as a leading text part. Data URL images are
/// inlined; remote images only reach the model as a textual reference.
pub fn build_generate_body(config: &ProviderConfig, request: &NormalizedRequest) -> Value {
    let mut parts = Vec::new();
    if let Some(system) = &request.system {
        parts.push(json!({"text": format!("System instruction: {}", system)}));
    }

    let mut has_prompt = false;
    if let Some(content) = &request.content_parts {
        for part in content {
            if matches!(part, ContentPart::Text { text } if *text == request.prompt) {
                has_prompt = true;
            }
            parts.push(content_part(part));
        }
    }
    if !has_prompt && !request.prompt.is_empty() {
        parts.push(json!({"text": request.prompt}));
    }

    let mut generation_config = json!({
        "temperature": config.params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    });
    if let Some(max_tokens) = config.params.max_tokens {
        generation_config["maxOutputTokens"] = json!(max_tokens);
    }

    json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": generation_config,
    })
}

/// Decodes streamGenerateContent output
///
/// Accepts SSE `data:` frames as well as the bare JSON array form.
#[derive(Debug, Default)]
pub struct GeminiFrameParser;

impl FrameParser for GeminiFrameParser {
    fn parse_line(&mut self, line: &str) -> AppResult<Vec<ProviderEvent>> {
        let Some(payload) = frame_payload(line) else {
            return Ok(vec![]);
        };
        let Some(value) = parse_json_payload(payload) else {
            return Ok(vec![]);
        };
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("stream error");
            return Err(AppError::ProviderStream(message.to_string()));
        }

        let chunk: GenerateResponse = serde_json::from_value(value).unwrap_or_default();
        let mut events = Vec::new();
        let text = chunk.text();
        if !text.is_empty() {
            events.push(ProviderEvent::Delta(text));
        }
        let finished = chunk
            .candidates
            .first()
            .is_some_and(|c| c.finish_reason.is_some());
        if let Some(usage) = chunk.usage_metadata {
            events.push(ProviderEvent::Usage(usage.into()));
        }
        if finished {
            events.push(ProviderEvent::Done);
        }
        Ok(events)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn run(&self, config: &ProviderConfig, request: &NormalizedRequest) -> AppResult<Completion> {
        let response = self.send(config, request, false).await?;
        let response: GenerateResponse = crate::services::transport::read_json(response).await?;
        let output = response.text();
        Ok(Completion {
            output,
            usage: response.usage_metadata.map(Usage::from),
        })
    }

    async fn stream(
        &self,
        config: &ProviderConfig,
        request: &NormalizedRequest,
    ) -> AppResult<BoxStream<'static, ProviderEvent>> {
        let response = self.send(config, request, true).await?;
        Ok(Box::pin(FrameStream::new(response.bytes_stream(), GeminiFrameParser)))
    }
}
