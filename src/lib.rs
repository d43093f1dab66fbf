//! Multi-provider LLM gateway library
//!
//! Normalizes requests to OpenAI-compatible, Anthropic and Gemini APIs,
//! fans one prompt out to many providers and streams the results back as
//! newline-delimited JSON.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::{Credentials, Settings};
pub use handlers::{create_router, create_router_with_state, AppState};
pub use providers::{Brand, Provider, ProviderContext, ProviderRegistry};
pub use services::{CompareJob, Orchestrator};
pub use utils::error::{AppError, AppResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
