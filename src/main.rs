//! Multi-provider LLM gateway server
//!
//! Serves the compare, upload and feng shui pipeline routes

use aicompare::{create_router, version_info, Credentials, Settings};
use anyhow::{Context, Result};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("Failed to load server settings")?;

    init_logging(&settings.logging.level, &settings.logging.format)?;
    info!("{}", version_info());
    if settings.is_dev_mode() {
        info!("Running in {} mode, upstream error details are exposed", settings.environment);
    }

    let credentials = Credentials::from_env();
    info!(
        "Credentials found for: {:?}",
        credentials.configured_brands()
    );

    let app = create_router(settings.clone(), credentials).await?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 Gateway started on http://{}", addr);
    info!("📝 Health check: http://{}/health", addr);
    info!("🔄 Compare endpoint: http://{}/compare", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    Ok(())
}

/// Initialize logging system
fn init_logging(level: &str, format: &str) -> Result<()> {
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if format == "json" {
        // JSON format logs (production environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(level)
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .finish(),
        )
    } else {
        // Human readable format (development environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(level)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Logging system initialized");
    Ok(())
}
