//! Provider module
//!
//! Defines the Provider trait, the adapter registry and the vendor adapters

pub mod anthropic;
pub mod brand;
pub mod decode;
pub mod gemini;
pub mod openai_compat;

use crate::config::Credentials;
use crate::models::{Completion, GeneratedImage, ImageRequest, NormalizedRequest, ProviderConfig, ProviderEvent, ProviderType};
use crate::services::transport::{HttpTransport, UpstreamPolicy};
use crate::utils::error::helpers::bad_request;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

pub use anthropic::AnthropicProvider;
pub use brand::{brand_of, resolve_brand, resolve_endpoint, Brand};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAICompatProvider;

/// A boxed stream of provider events
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = AppResult<T>> + Send + 'a>>;

/// Vendor adapter
///
/// Translates a normalized request into one vendor's wire format and the
/// vendor's response back into normalized results.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Whole-response call
    async fn run(&self, config: &ProviderConfig, request: &NormalizedRequest) -> AppResult<Completion>;

    /// Streaming call
    ///
    /// The returned stream yields deltas and usage in arrival order and ends
    /// with exactly one `Done`, or with an `Err` on failure.
    async fn stream(
        &self,
        config: &ProviderConfig,
        request: &NormalizedRequest,
    ) -> AppResult<BoxStream<'static, ProviderEvent>>;

    /// Image generation
    async fn run_images(&self, _config: &ProviderConfig, _request: &ImageRequest) -> AppResult<GeneratedImage> {
        Err(AppError::UnsupportedOperation(format!(
            "{} does not support image generation",
            self.name()
        )))
    }
}

/// Shared dependencies handed to every adapter
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub credentials: Arc<Credentials>,
    pub transport: HttpTransport,
    pub policy: UpstreamPolicy,
}

impl ProviderContext {
    pub fn new(credentials: Credentials, transport: HttpTransport, policy: UpstreamPolicy) -> Self {
        Self {
            credentials: Arc::new(credentials),
            transport,
            policy,
        }
    }
}

/// Adapters keyed by provider type
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Registry with every built-in adapter
    pub fn new(context: ProviderContext) -> Self {
        let registry = Self::empty()
            .with(ProviderType::OpenAICompat, Arc::new(OpenAICompatProvider::new(context.clone())))
            .with(ProviderType::Anthropic, Arc::new(AnthropicProvider::new(context.clone())))
            .with(ProviderType::Gemini, Arc::new(GeminiProvider::new(context)));

        info!("Provider registry initialized with {} adapters", registry.providers.len());
        registry
    }

    /// Registry without adapters
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register or replace the adapter for a type
    pub fn with(mut self, provider_type: ProviderType, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider_type, provider);
        self
    }

    /// Adapter for a type
    pub fn get(&self, provider_type: &ProviderType) -> AppResult<Arc<dyn Provider>> {
        self.providers
            .get(provider_type)
            .cloned()
            .ok_or_else(|| bad_request(format!("unknown provider type: {}", provider_type)))
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.providers.keys().map(|t| t.to_string()).collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("types", &self.types()).finish()
    }
}
