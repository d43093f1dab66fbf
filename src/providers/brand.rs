//! Vendor brand classification
//!
//! A brand picks the credential source, default base URL and body quirks
//! for a provider config. Classification is a best-effort heuristic over
//! the base URL host and the caller's id, not a protocol guarantee.

use crate::models::{ProviderConfig, ProviderType};
use crate::utils::url::normalize_base_url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical vendor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    OpenAI,
    DeepSeek,
    Qianwen,
    Doubao,
    OpenRouter,
    Azure,
    Anthropic,
    Gemini,
    /// Unrecognised OpenAI-compatible endpoint
    Generic,
}

/// Host fragments checked in order against the base URL
const HOST_PATTERNS: &[(&str, Brand)] = &[
    ("volces.com", Brand::Doubao),
    ("dashscope.aliyuncs.com", Brand::Qianwen),
    ("openrouter.ai", Brand::OpenRouter),
    ("deepseek.com", Brand::DeepSeek),
    ("api.openai.com", Brand::OpenAI),
    ("anthropic.com", Brand::Anthropic),
    ("generativelanguage.googleapis.com", Brand::Gemini),
];

impl Brand {
    pub const ALL: [Brand; 9] = [
        Brand::OpenAI,
        Brand::DeepSeek,
        Brand::Qianwen,
        Brand::Doubao,
        Brand::OpenRouter,
        Brand::Azure,
        Brand::Anthropic,
        Brand::Gemini,
        Brand::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::OpenAI => "openai",
            Brand::DeepSeek => "deepseek",
            Brand::Qianwen => "qianwen",
            Brand::Doubao => "doubao",
            Brand::OpenRouter => "openrouter",
            Brand::Azure => "azure",
            Brand::Anthropic => "anthropic",
            Brand::Gemini => "gemini",
            Brand::Generic => "generic",
        }
    }

    /// Parse a caller id that names a brand directly
    pub fn from_id(id: &str) -> Option<Brand> {
        let id = id.trim().to_ascii_lowercase();
        Brand::ALL
            .into_iter()
            .filter(|b| *b != Brand::Generic)
            .find(|b| b.as_str() == id)
    }

    /// Base URL used when the config does not carry one
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Brand::OpenAI | Brand::Azure | Brand::Generic => "https://api.openai.com/v1",
            Brand::OpenRouter => "https://openrouter.ai/api/v1",
            Brand::DeepSeek => "https://api.deepseek.com/v1",
            Brand::Qianwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Brand::Doubao => "https://ark.cn-beijing.volces.com/api/v3",
            Brand::Anthropic => "https://api.anthropic.com/v1",
            Brand::Gemini => "https://generativelanguage.googleapis.com/v1",
        }
    }

    /// Environment variables holding this brand's key, in priority order
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            Brand::OpenAI => &["OPENAI_API_KEY"],
            Brand::DeepSeek => &["DEEPSEEK_API_KEY"],
            Brand::Qianwen => &["DASHSCOPE_API_KEY"],
            Brand::Doubao => &["DOUBAO_API_KEY", "DOUDAO_API_KEY"],
            Brand::OpenRouter => &["OPENROUTER_API_KEY"],
            Brand::Azure => &["AZURE_OPENAI_API_KEY"],
            Brand::Anthropic => &["ANTHROPIC_API_KEY"],
            Brand::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Brand::Generic => &[],
        }
    }

    /// Whether the vendor wants `image_url` flattened to a bare string
    pub fn flattens_image_urls(&self) -> bool {
        matches!(self, Brand::Doubao)
    }

    /// Whether the vendor is known to respond slowly
    pub fn is_slow(&self) -> bool {
        matches!(self, Brand::Doubao)
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a brand from the base URL, then the id, then the type
pub fn resolve_brand(id: &str, provider_type: &ProviderType, base_url: Option<&str>) -> Brand {
    if let Some(url) = base_url {
        let url = url.to_ascii_lowercase();
        if let Some((_, brand)) = HOST_PATTERNS.iter().find(|(host, _)| url.contains(host)) {
            return *brand;
        }
    }

    if let Some(brand) = Brand::from_id(id) {
        return brand;
    }

    match provider_type {
        ProviderType::Anthropic => Brand::Anthropic,
        ProviderType::Gemini => Brand::Gemini,
        _ if id.trim().is_empty() => Brand::OpenAI,
        _ => Brand::Generic,
    }
}

/// Brand of a provider config
pub fn brand_of(config: &ProviderConfig) -> Brand {
    resolve_brand(&config.id, &config.provider_type, config.params.base_url.as_deref())
}

/// Effective brand and normalized base URL of a provider config
///
/// A missing base URL is filled from the brand default and the brand is
/// classified again against it, so an unrecognised id without URL ends up
/// on the OpenAI endpoint with OpenAI credentials.
pub fn resolve_endpoint(config: &ProviderConfig) -> (Brand, String) {
    let base_url = match config.params.base_url.as_deref().map(normalize_base_url) {
        Some(url) if !url.is_empty() => url,
        _ => brand_of(config).default_base_url().to_string(),
    };
    let brand = resolve_brand(&config.id, &config.provider_type, Some(&base_url));
    (brand, base_url)
}
