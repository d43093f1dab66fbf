//! Logging utilities
//!
//! Helpers that keep prompts, images and keys out of debug logs

use crate::models::{ContentPart, NormalizedRequest, ProviderConfig};
use crate::utils::data_url::is_data_url;

/// Set to true to include full prompts in debug logs
/// Default is false to reduce log verbosity
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Truncate a string with a note about original length
pub fn truncate_content(s: &str, max_len: usize) -> String {
    let total = s.chars().count();
    if total > max_len {
        let head: String = s.chars().take(max_len).collect();
        format!("{}... ({} chars truncated)", head, total - max_len)
    } else {
        s.to_string()
    }
}

/// Show only the first five characters of a key plus its length
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(5).collect();
    format!("{}*** (len={})", prefix, key.chars().count())
}

/// Short description of an image reference that never includes inline bytes
pub fn describe_image_ref(url: &str) -> String {
    if is_data_url(url) {
        let header = url.split(',').next().unwrap_or("data:");
        format!("{},[{} bytes]", header, url.len())
    } else {
        truncate_content(url, 120)
    }
}

/// Create a filtered summary of a normalized request for logging
pub fn create_request_log_summary(request: &NormalizedRequest) -> serde_json::Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::json!({
            "prompt": request.prompt,
            "system": request.system,
            "content_parts": request.content_parts.as_ref().map(|p| p.len()),
        });
    }

    let parts: Vec<serde_json::Value> = request
        .content_parts
        .iter()
        .flatten()
        .map(|part| match part {
            ContentPart::Text { text } => {
                serde_json::json!({"type": "text", "text": truncate_content(text, 100)})
            }
            ContentPart::ImageUrl { image_url } => {
                serde_json::json!({"type": "image_url", "url": describe_image_ref(&image_url.url)})
            }
        })
        .collect();

    serde_json::json!({
        "prompt": truncate_content(&request.prompt, 200),
        "system": request.system.as_deref().map(|s| truncate_content(s, 100)),
        "content_parts": parts,
    })
}

/// Provider summary without the inline key
pub fn create_provider_log_summary(config: &ProviderConfig) -> serde_json::Value {
    serde_json::json!({
        "id": config.id,
        "type": config.provider_type.as_str(),
        "model": config.params.model,
        "base_url": config.params.base_url,
        "api_key": config.params.api_key.as_deref().map(mask_key),
    })
}
