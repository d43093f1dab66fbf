//! `data:` URL parsing and construction

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Decoded parts of a base64 `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    /// Base64 payload, still encoded
    pub data: String,
}

impl DataUrl {
    /// Parse `data:<mime>;base64,<payload>`
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url.trim().strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mut params = header.split(';');
        let mime_type = match params.next() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => "application/octet-stream".to_string(),
        };
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return None;
        }
        Some(Self { mime_type, data: data.to_string() })
    }

    /// Build a data URL from raw bytes
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self { mime_type: mime_type.to_string(), data: STANDARD.encode(bytes) }
    }

    /// Decode the payload into bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.as_bytes())
    }

    /// File extension matching the mime type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

impl std::fmt::Display for DataUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Whether a string looks like a data URL
pub fn is_data_url(url: &str) -> bool {
    url.trim_start().starts_with("data:")
}
