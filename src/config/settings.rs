//! Application configuration settings
//!
//! Defines all configuration structures and loading logic

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    pub server: ServerConfig,
    /// Outbound vendor call policy
    pub upstream: UpstreamConfig,
    /// Artifact storage
    pub uploads: UploadsConfig,
    /// Request configuration
    pub request: RequestConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Model listing proxy
    pub openrouter: OpenRouterConfig,
    /// `production` hides upstream details in error bodies
    pub environment: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Origin used for absolute `/uploads` URLs when no forwarding headers are present
    #[serde(default)]
    pub public_origin: Option<String>,
}

/// Timeouts and retries for vendor calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
    /// Used for slow brands and image generation
    pub slow_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

/// Local and hosted artifact storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    /// Image host backend name, `none` disables hosting
    pub image_host: String,
}

/// Request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allowed origins for CORS
    pub allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or env-filter directive
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    pub models_url: String,
}

impl Settings {
    /// Create a new configuration instance from files and the process environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok(), &default_config_files())
    }

    /// Build settings from an injected variable lookup and optional config files
    pub fn from_lookup<F>(lookup: F, files: &[PathBuf]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let uploads_dir = if env("VERCEL").as_deref() == Some("1") {
            "/tmp/uploads"
        } else {
            "./uploads"
        };

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("upstream.timeout_secs", 30)?
            .set_default("upstream.slow_timeout_secs", 60)?
            .set_default("upstream.stream_timeout_secs", 300)?
            .set_default("upstream.retries", 1)?
            .set_default("upstream.retry_delay_ms", 500)?
            .set_default("uploads.dir", uploads_dir)?
            .set_default("uploads.image_host", "none")?
            .set_default("request.max_request_size", 50 * 1024 * 1024)?
            .set_default("security.allowed_origins", vec!["*"])?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("openrouter.models_url", "https://openrouter.ai/api/v1/models")?
            .set_default("environment", "development")?;

        for file in files {
            builder = builder.add_source(File::from(file.as_path()).required(false));
        }

        let origins = env("CORS_ORIGIN").map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });

        let settings: Settings = builder
            .set_override_option("server.host", env("SERVER_HOST"))?
            .set_override_option("server.port", env("PORT").or_else(|| env("SERVER_PORT")))?
            .set_override_option("server.public_origin", env("PUBLIC_SERVER_ORIGIN"))?
            .set_override_option("upstream.timeout_secs", env("REQUEST_TIMEOUT"))?
            .set_override_option("upstream.slow_timeout_secs", env("SLOW_REQUEST_TIMEOUT"))?
            .set_override_option("upstream.stream_timeout_secs", env("STREAM_TIMEOUT"))?
            .set_override_option("upstream.retries", env("RETRY_COUNT"))?
            .set_override_option("upstream.retry_delay_ms", env("RETRY_DELAY_MS"))?
            .set_override_option("uploads.dir", env("UPLOADS_DIR"))?
            .set_override_option("uploads.image_host", env("IMAGE_HOST"))?
            .set_override_option("request.max_request_size", env("MAX_REQUEST_SIZE"))?
            .set_override_option("security.allowed_origins", origins)?
            .set_override_option("logging.level", env("RUST_LOG"))?
            .set_override_option("logging.format", env("LOG_FORMAT"))?
            .set_override_option("openrouter.models_url", env("OPENROUTER_MODELS_URL"))?
            .set_override_option("environment", env("APP_ENV"))?
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration value")?;

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port == 0 {
            anyhow::bail!("Port number cannot be 0");
        }

        // Validate timeout values
        if self.upstream.timeout_secs == 0
            || self.upstream.slow_timeout_secs == 0
            || self.upstream.stream_timeout_secs == 0
        {
            anyhow::bail!("Timeout values cannot be 0");
        }

        // Validate request size limit
        if self.request.max_request_size == 0 {
            anyhow::bail!("Maximum request size cannot be 0");
        }

        // Validate log level, full env-filter directives are passed through
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.logging.level.as_str();
        if !level.contains('=') && !valid_levels.contains(&level) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        // Validate log format
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        if !self.openrouter.models_url.starts_with("http") {
            anyhow::bail!("Invalid OpenRouter models URL, should start with 'http'");
        }

        Ok(())
    }

    /// Whether upstream details must be hidden from error bodies
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Check if in development mode
    pub fn is_dev_mode(&self) -> bool {
        !self.is_production()
    }

    /// Origin used for absolute URLs when request headers do not provide one
    pub fn fallback_origin(&self) -> String {
        match &self.server.public_origin {
            Some(origin) => origin.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    pub fn slow_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.slow_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.stream_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.upstream.retry_delay_ms)
    }
}

/// Config files consulted by [`Settings::new`], lowest priority first
pub fn default_config_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(config_dir) = dirs::config_dir() {
        let dir = config_dir.join("aicompare");
        files.push(dir.join("aicompare.toml"));
        files.push(dir.join("aicompare.json"));
    }
    files.push(PathBuf::from("aicompare.toml"));
    files.push(PathBuf::from("aicompare.json"));
    files
}
