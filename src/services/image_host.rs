//! External image host
//!
//! Some vendors only accept publicly resolvable image URLs. An [`ImageHost`]
//! turns bytes into such a URL.

use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

const HOST_ATTEMPTS: u32 = 2;
const HOST_RETRY_DELAY: Duration = Duration::from_millis(400);

/// Artifact sink returning a public URL
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Host name reported to clients
    fn name(&self) -> &str;

    /// Upload bytes and return their public URL
    async fn upload(&self, bytes: &[u8], filename: &str) -> AppResult<String>;
}

/// Host used when no external hosting is configured; every upload fails
#[derive(Debug, Clone, Default)]
pub struct NoImageHost;

#[async_trait]
impl ImageHost for NoImageHost {
    fn name(&self) -> &str {
        "none"
    }

    async fn upload(&self, _bytes: &[u8], filename: &str) -> AppResult<String> {
        Err(AppError::UnsupportedOperation(format!(
            "no image host configured for {}",
            filename
        )))
    }
}

/// Upload with a single retry
pub async fn host_with_retry(host: &dyn ImageHost, bytes: &[u8], filename: &str) -> AppResult<String> {
    let mut attempt = 1;
    loop {
        match host.upload(bytes, filename).await {
            Ok(url) => return Ok(url),
            Err(e) if attempt < HOST_ATTEMPTS => {
                warn!("Image host {} upload failed (attempt {}): {}", host.name(), attempt, e);
                attempt += 1;
                tokio::time::sleep(HOST_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}
