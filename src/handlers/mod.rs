//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic

pub mod compare;
pub mod fengshui;
pub mod health;
pub mod openrouter;
pub mod upload;

use crate::config::{Credentials, Settings};
use crate::middleware::request_logging_middleware;
use crate::providers::{Brand, ProviderContext, ProviderRegistry};
use crate::services::{
    ContentResolver, HttpTransport, ImageHost, LocalStore, NoImageHost, Orchestrator, UpstreamPolicy,
};
use crate::utils::error::helpers::bad_request;
use crate::utils::error::{AppError, AppResult};
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub orchestrator: Orchestrator,
    pub resolver: ContentResolver,
    pub transport: HttpTransport,
    pub policy: UpstreamPolicy,
    pub configured_brands: Vec<Brand>,
    pub started_at: Instant,
}

impl AppState {
    /// State with the built-in adapters and no external image host
    pub fn new(settings: Settings, credentials: Credentials) -> AppResult<Self> {
        let transport = HttpTransport::new()?;
        let policy = UpstreamPolicy::from_settings(&settings);
        let configured_brands = credentials.configured_brands();
        let context = ProviderContext::new(credentials, transport.clone(), policy.clone());
        let registry = ProviderRegistry::new(context);

        let host = settings.uploads.image_host.as_str();
        if host != "none" {
            warn!("Image host '{}' is not available in this build, uploads stay local", host);
        }

        let mut state = Self::assemble(settings, registry, transport, Arc::new(NoImageHost));
        state.configured_brands = configured_brands;
        Ok(state)
    }

    /// State around an explicit registry and image host
    pub fn with_registry(
        settings: Settings,
        registry: ProviderRegistry,
        image_host: Arc<dyn ImageHost>,
    ) -> AppResult<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::assemble(settings, registry, transport, image_host))
    }

    fn assemble(
        settings: Settings,
        registry: ProviderRegistry,
        transport: HttpTransport,
        image_host: Arc<dyn ImageHost>,
    ) -> Self {
        let policy = UpstreamPolicy::from_settings(&settings);
        let store = LocalStore::new(settings.uploads.dir.clone());
        let resolver = ContentResolver::new(store, image_host, transport.clone(), policy.clone());

        Self {
            orchestrator: Orchestrator::new(Arc::new(registry)),
            resolver,
            transport,
            policy,
            configured_brands: Vec::new(),
            started_at: Instant::now(),
            settings,
        }
    }
}

/// Create application router
pub async fn create_router(settings: Settings, credentials: Credentials) -> Result<Router> {
    let state = AppState::new(settings, credentials)?;
    if let Err(e) = state.resolver.store().ensure_dir().await {
        warn!("Upload directory unavailable: {}", e);
    }
    Ok(create_router_with_state(Arc::new(state)))
}

/// Routes served both at the root and under `/api`
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/compare", post(compare::compare))
        .route("/compare/stream", post(compare::compare_stream))
        .route("/upload", post(upload::upload))
        .route("/fengshui/analyze-image", post(fengshui::analyze_image))
        .route("/fengshui/advise", post(fengshui::advise))
        .route("/fengshui/generate-ref", post(fengshui::generate_ref))
        .route("/openrouter/models", get(openrouter::list_models))
}

/// Create the router around a prepared state
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let settings = &state.settings;
    let uploads = ServeDir::new(settings.uploads.dir.clone());

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.security.allowed_origins))
        .layer(DefaultBodyLimit::max(settings.request.max_request_size));

    info!(
        "Router ready: uploads at {}, body limit {} bytes",
        settings.uploads.dir.display(),
        settings.request.max_request_size
    );

    Router::new()
        .merge(api_routes())
        .nest("/api", api_routes())
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .nest_service("/uploads", uploads)
        .layer(from_fn(request_logging_middleware))
        .layer(middleware_stack)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Map a JSON body rejection to a 400, or a 413 past the body limit
pub(crate) fn reject_json(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(rejection.body_text());
    }
    bad_request(format!("bad request: {}", rejection.body_text()))
}

/// Public origin of the current request
///
/// Proxy headers win, then the `Host` header, then the configured origin.
pub fn request_origin(headers: &HeaderMap, settings: &Settings) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let host = header("x-forwarded-host").or_else(|| header("host"));
    match host {
        Some(host) => {
            let default_proto = if settings.is_production() { "https" } else { "http" };
            let proto = header("x-forwarded-proto")
                .or_else(|| header("x-forwarded-protocol"))
                .unwrap_or_else(|| default_proto.to_string());
            format!("{}://{}", proto, host)
        }
        None => settings.fallback_origin(),
    }
}
