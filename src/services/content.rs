//! Content-part resolution
//!
//! Image references reach the server as remote URLs, data URLs or local
//! `/uploads/...` paths. Before a vision call the reference is rewritten into
//! the form the target vendor can consume:
//!
//! - Gemini cannot fetch external URLs, so the bytes are fetched here and
//!   inlined as a data URL.
//! - Doubao wants a public URL, so data URLs are pushed to the image host,
//!   falling back to the local store served at an absolute `/uploads/` URL.

use super::image_host::{host_with_retry, ImageHost};
use super::storage::{uploads_name, LocalStore};
use super::transport::{HttpTransport, UpstreamPolicy};
use crate::models::{now_millis, ProviderConfig, ProviderType};
use crate::providers::{brand_of, Brand};
use crate::utils::data_url::{is_data_url, DataUrl};
use crate::utils::error::{AppResult, ErrorContext};
use crate::utils::logging::describe_image_ref;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_FETCHED_MIME: &str = "image/png";

/// Rewrites image references per vendor
#[derive(Clone)]
pub struct ContentResolver {
    store: LocalStore,
    image_host: Arc<dyn ImageHost>,
    transport: HttpTransport,
    policy: UpstreamPolicy,
}

impl ContentResolver {
    pub fn new(
        store: LocalStore,
        image_host: Arc<dyn ImageHost>,
        transport: HttpTransport,
        policy: UpstreamPolicy,
    ) -> Self {
        Self {
            store,
            image_host,
            transport,
            policy,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn image_host(&self) -> &dyn ImageHost {
        self.image_host.as_ref()
    }

    /// Resolve an image reference for a vision call to `config`
    ///
    /// `origin` is the public origin used to make local paths absolute.
    pub async fn resolve_image(&self, url: &str, config: &ProviderConfig, origin: &str) -> String {
        if config.provider_type == ProviderType::Gemini {
            return self.inline_for_gemini(url, origin).await;
        }
        if brand_of(config) == Brand::Doubao {
            return self.publish_for_doubao(url, origin).await;
        }
        absolutize(url, origin)
    }

    /// Resolve the reference image of an image generation call
    ///
    /// Data URLs go through the image host or the local store; other
    /// references are made absolute.
    pub async fn resolve_reference(&self, url: &str, origin: &str) -> AppResult<String> {
        match DataUrl::parse(url) {
            Some(data) => self.publish_data_url(&data, origin).await,
            None => Ok(absolutize(url, origin)),
        }
    }

    /// Write a data URL to the local store and try the image host
    ///
    /// Returns the stored name, its absolute local URL and the hosted URL if
    /// hosting succeeded.
    pub async fn store_upload(
        &self,
        data: &DataUrl,
        filename: Option<&str>,
        origin: &str,
    ) -> AppResult<(String, String, Option<String>)> {
        let name = match filename.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => upload_name(data),
        };
        let bytes = decode(data)?;
        let path = self.store.save(&name, &bytes).await?;
        let local_url = format!("{}{}", origin, path);

        let hosted = match host_with_retry(self.image_host.as_ref(), &bytes, &name).await {
            Ok(url) => {
                info!("Upload hosted via {}: {}", self.image_host.name(), url);
                Some(url)
            }
            Err(e) => {
                warn!("Image host failed for {}: {}", name, e);
                None
            }
        };
        Ok((name, local_url, hosted))
    }

    /// Save raw image bytes under a generated name and return the absolute URL
    pub async fn store_generated(&self, b64: &str, origin: &str) -> AppResult<String> {
        let data = DataUrl {
            mime_type: "image/png".to_string(),
            data: b64.to_string(),
        };
        let name = format!("gen_{}.png", unique_suffix());
        let path = self.store.save(&name, &decode(&data)?).await?;
        Ok(format!("{}{}", origin, path))
    }

    async fn inline_for_gemini(&self, url: &str, origin: &str) -> String {
        if is_data_url(url) {
            return url.to_string();
        }

        let inlined = match uploads_name(url) {
            Some(name) => self.inline_local(name).await,
            None => self.inline_remote(&absolutize(url, origin)).await,
        };
        match inlined {
            Ok(data) => {
                debug!("Inlined {} for Gemini", describe_image_ref(url));
                data.to_string()
            }
            Err(e) => {
                warn!("Inline image for Gemini failed, passing URL through: {}", e);
                absolutize(url, origin)
            }
        }
    }

    async fn inline_local(&self, name: &str) -> AppResult<DataUrl> {
        let bytes = self.store.read(name).await?;
        let mime = mime_guess::from_path(name)
            .first_raw()
            .unwrap_or(DEFAULT_FETCHED_MIME);
        Ok(DataUrl::from_bytes(mime, &bytes))
    }

    async fn inline_remote(&self, url: &str) -> AppResult<DataUrl> {
        let (bytes, content_type) = self.transport.fetch_bytes(url, &self.policy.fetch()).await?;
        let mime = content_type
            .filter(|ct| ct.starts_with("image/"))
            .or_else(|| mime_guess::from_path(url).first_raw().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_FETCHED_MIME.to_string());
        Ok(DataUrl::from_bytes(&mime, &bytes))
    }

    async fn publish_for_doubao(&self, url: &str, origin: &str) -> String {
        let Some(data) = DataUrl::parse(url) else {
            return absolutize(url, origin);
        };
        match self.publish_data_url(&data, origin).await {
            Ok(public) => public,
            Err(e) => {
                warn!("Doubao image prepare failed, passing data URL through: {}", e);
                url.to_string()
            }
        }
    }

    async fn publish_data_url(&self, data: &DataUrl, origin: &str) -> AppResult<String> {
        let name = upload_name(data);
        let bytes = decode(data)?;
        match host_with_retry(self.image_host.as_ref(), &bytes, &name).await {
            Ok(url) => {
                info!("Image hosted via {}: {}", self.image_host.name(), url);
                Ok(url)
            }
            Err(e) => {
                warn!("Image host failed, falling back to local store: {}", e);
                let path = self.store.save(&name, &bytes).await?;
                Ok(format!("{}{}", origin, path))
            }
        }
    }
}

impl std::fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentResolver")
            .field("store", &self.store)
            .field("image_host", &self.image_host.name())
            .finish()
    }
}

fn decode(data: &DataUrl) -> AppResult<Vec<u8>> {
    data.decode().bad_request_context("invalid base64 image")
}

fn upload_name(data: &DataUrl) -> String {
    format!("upload_{}.{}", unique_suffix(), data.extension())
}

fn unique_suffix() -> String {
    format!("{}_{}", now_millis(), Uuid::new_v4().simple())
}

/// Make a server-relative path absolute against `origin`
pub fn absolutize(url: &str, origin: &str) -> String {
    if url.starts_with('/') && !url.starts_with("//") {
        format!("{}{}", origin.trim_end_matches('/'), url)
    } else {
        url.to_string()
    }
}
