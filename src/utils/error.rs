//! Error handling module
//!
//! Defines error types and handling logic used in the project

use crate::providers::Brand;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of upstream body bytes kept on a provider error
const BODY_EXCERPT_LIMIT: usize = 2000;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed request fields
    #[error("{0}")]
    BadRequest(String),

    /// Request body exceeds the configured limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// No usable API key for the resolved brand
    #[error("Missing API key: {brand}")]
    MissingCredential { brand: Brand },

    /// Upstream vendor answered with a non-2xx status
    #[error("HTTP {status} for {url}: {body}")]
    ProviderHttp {
        status: u16,
        url: String,
        body: String,
    },

    /// Network failure, timeout or abort talking to a vendor
    #[error("Provider request failed: {0}")]
    ProviderTransport(String),

    /// Vendor reported an error frame in the middle of a stream
    #[error("Provider stream error: {0}")]
    ProviderStream(String),

    /// Vendor payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Adapter does not implement the requested operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Artifact storage failure (local store or image host)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,
    /// Upstream details, omitted in production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ErrorDebug>,
}

/// Upstream request details attached to provider failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDebug {
    #[serde(rename = "providerUrl", skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
    #[serde(rename = "providerResponse", skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<String>,
}

impl AppError {
    /// Build a provider HTTP error, keeping only an excerpt of the body
    pub fn provider_http(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let body = if body.len() > BODY_EXCERPT_LIMIT {
            let mut end = BODY_EXCERPT_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body[..end].to_string()
        } else {
            body
        };
        AppError::ProviderHttp { status, url: url.into(), body }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::MissingCredential { .. }
            | AppError::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ProviderHttp { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Config(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::ProviderTransport(_)
            | AppError::ProviderStream(_)
            | AppError::Decode(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::MissingCredential { .. } => "missing_credential",
            AppError::ProviderHttp { .. } => "provider_http_error",
            AppError::ProviderTransport(_) => "provider_transport_error",
            AppError::ProviderStream(_) => "provider_stream_error",
            AppError::Decode(_) => "decode_error",
            AppError::UnsupportedOperation(_) => "unsupported_operation",
            AppError::NotFound(_) => "not_found",
            AppError::Storage(_) => "storage_error",
            AppError::Config(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether a failed attempt may be retried by the transport
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ProviderHttp { status, .. } => is_transient_status(*status),
            AppError::ProviderTransport(_) => true,
            _ => false,
        }
    }

    /// Whether detailed error information should be logged
    pub fn should_log_details(&self) -> bool {
        !matches!(
            self,
            AppError::BadRequest(_) | AppError::PayloadTooLarge(_) | AppError::MissingCredential { .. }
        )
    }

    /// Upstream request details, if this error came from a vendor call
    pub fn debug_info(&self) -> Option<ErrorDebug> {
        match self {
            AppError::ProviderHttp { url, body, .. } => Some(ErrorDebug {
                provider_url: Some(url.clone()),
                provider_response: Some(body.clone()),
            }),
            _ => None,
        }
    }

    /// Convert to the JSON error body
    pub fn to_error_response(&self, include_debug: bool) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            debug: if include_debug { self.debug_info() } else { None },
        }
    }
}

/// Statuses that warrant one more attempt
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ErrorReply::new(self, false).into_response()
    }
}

/// An error paired with the decision whether to expose upstream details
#[derive(Debug)]
pub struct ErrorReply {
    pub error: AppError,
    pub include_debug: bool,
}

impl ErrorReply {
    pub fn new(error: AppError, include_debug: bool) -> Self {
        Self { error, include_debug }
    }
}

impl From<AppError> for ErrorReply {
    fn from(error: AppError) -> Self {
        Self::new(error, false)
    }
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        // Log error
        if self.error.should_log_details() {
            tracing::error!("Application error: {} - Status code: {}", self.error, status);
        } else {
            tracing::warn!("Client error: {} - Status code: {}", self.error.error_type(), status);
        }

        let body = self.error.to_error_response(self.include_debug);
        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Error handling helper functions
pub mod helpers {
    use super::*;

    /// Create bad request error
    pub fn bad_request(message: impl Into<String>) -> AppError {
        AppError::BadRequest(message.into())
    }

    /// Create transport error
    pub fn transport_error(message: impl Into<String>) -> AppError {
        AppError::ProviderTransport(message.into())
    }

    /// Create decode error
    pub fn decode_error(message: impl Into<String>) -> AppError {
        AppError::Decode(message.into())
    }

    /// Create storage error
    pub fn storage_error(message: impl Into<String>) -> AppError {
        AppError::Storage(message.into())
    }

    /// Create internal error
    pub fn internal_error(message: impl Into<String>) -> AppError {
        AppError::Internal(message.into())
    }
}

/// Error context extension trait
pub trait ErrorContext<T> {
    /// Add bad request context
    fn bad_request_context(self, message: &str) -> AppResult<T>;

    /// Add decode error context
    fn decode_context(self, message: &str) -> AppResult<T>;

    /// Add storage error context
    fn storage_context(self, message: &str) -> AppResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn bad_request_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::BadRequest(format!("{}: {}", message, e)))
    }

    fn decode_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Decode(format!("{}: {}", message, e)))
    }

    fn storage_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Storage(format!("{}: {}", message, e)))
    }
}
