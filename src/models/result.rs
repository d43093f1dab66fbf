//! Normalized results and stream events

use serde::{Deserialize, Serialize};

/// Token usage, normalized across vendors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Usage whose total is the sum of both sides
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage with a vendor-reported total, falling back to the sum
    pub fn with_total(prompt_tokens: u64, completion_tokens: u64, total: Option<u64>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total.unwrap_or(prompt_tokens + completion_tokens),
        }
    }
}

/// Whole-response output of one adapter call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub output: String,
    pub usage: Option<Usage>,
}

/// Wall-clock timing of one provider call, epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub start: i64,
    pub end: i64,
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
}

impl Timings {
    pub fn since(start: i64) -> Self {
        let end = now_millis();
        Self { start, end, duration_ms: end - start }
    }
}

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One provider's entry in a batch compare response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    pub id: String,
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub usage: Option<Usage>,
    pub timings: Timings,
}

/// Event emitted by an adapter's stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Newly produced text only
    Delta(String),
    Usage(Usage),
    /// Vendor signalled completion
    Done,
}

/// Outbound NDJSON event, tagged with the originating provider id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        id: String,
        name: String,
        t: i64,
    },
    Delta {
        id: String,
        delta: String,
    },
    Usage {
        id: String,
        usage: Usage,
    },
    Done {
        id: String,
        name: String,
        ok: bool,
        output: String,
        timings: Timings,
    },
    Error {
        id: String,
        name: String,
        ok: bool,
        error: String,
        timings: Timings,
    },
}

impl StreamEvent {
    pub fn id(&self) -> &str {
        match self {
            StreamEvent::Start { id, .. }
            | StreamEvent::Delta { id, .. }
            | StreamEvent::Usage { id, .. }
            | StreamEvent::Done { id, .. }
            | StreamEvent::Error { id, .. } => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// Serialize as one NDJSON line, newline included
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Result of an image generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Publicly reachable URL returned by the vendor
    Url(String),
    /// Inline base64 PNG payload
    B64(String),
}
