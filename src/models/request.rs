//! Normalized request schema and route payloads

use super::provider::ProviderConfig;
use serde::{Deserialize, Serialize};

/// One logical request, built once per provider call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Present only for vision calls
    #[serde(rename = "contentParts", default, skip_serializing_if = "Option::is_none")]
    pub content_parts: Option<Vec<ContentPart>>,
}

impl NormalizedRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    /// Set the system prompt, ignoring blank values
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_content_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.content_parts = Some(parts);
        self
    }

    /// Image URLs in content order
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.content_parts.iter().flatten().filter_map(|part| match part {
            ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
            ContentPart::Text { .. } => None,
        })
    }
}

/// One unit of multimodal input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl { image_url: ImageUrl { url: url.into() } }
    }
}

/// Image reference. Accepts both `{"url": ..}` and a bare string on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ImageUrlRepr")]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageUrlRepr {
    Bare(String),
    Object { url: String },
}

impl From<ImageUrlRepr> for ImageUrl {
    fn from(value: ImageUrlRepr) -> Self {
        match value {
            ImageUrlRepr::Bare(url) | ImageUrlRepr::Object { url } => ImageUrl { url },
        }
    }
}

/// Body of `/compare` and `/compare/stream`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub providers: Option<Vec<ProviderConfig>>,
}

/// Image generation input for the OpenAI-compatible images endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Reference images, already resolved to fetchable URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Forces the response format, overriding brand defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}
