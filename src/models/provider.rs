//! Provider configuration as sent by callers

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Adapter family a configuration is dispatched to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderType {
    /// Any endpoint speaking the OpenAI chat completions protocol
    OpenAICompat,
    Anthropic,
    Gemini,
    /// A type string no adapter is registered for
    Unknown(String),
}

impl ProviderType {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderType::OpenAICompat => "openai-compat",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Unknown(other) => other,
        }
    }
}

impl Default for ProviderType {
    fn default() -> Self {
        ProviderType::OpenAICompat
    }
}

impl From<String> for ProviderType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai-compat" | "openai_compat" | "openai" => ProviderType::OpenAICompat,
            "anthropic" => ProviderType::Anthropic,
            "gemini" => ProviderType::Gemini,
            _ => ProviderType::Unknown(value),
        }
    }
}

impl From<ProviderType> for String {
    fn from(value: ProviderType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured vendor endpoint, built by the caller per request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Caller-assigned stable id
    #[serde(default)]
    pub id: String,
    /// Display label
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub params: ProviderParams,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, provider_type: ProviderType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_type,
            params: ProviderParams::default(),
        }
    }
}

/// Endpoint parameters. Empty strings from form inputs read as unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderParams {
    #[serde(
        rename = "baseURL",
        alias = "baseUrl",
        alias = "base_url",
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Zero is treated as unset
    #[serde(default, deserialize_with = "lenient_max_tokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(
        rename = "apiKey",
        alias = "api_key",
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,
    /// Per-provider system prompt, wins over the request-level one
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    // Image generation extras
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Unrecognised keys, kept so they survive a round trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn number_like(value: Option<serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_like(Option::deserialize(deserializer)?))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_like(Option::deserialize(deserializer)?).map(|n| n as i64))
}

fn lenient_max_tokens<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_like(Option::deserialize(deserializer)?)
        .filter(|n| *n >= 1.0)
        .map(|n| n.min(u32::MAX as f64) as u32))
}
