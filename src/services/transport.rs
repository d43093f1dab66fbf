//! HTTP transport service
//!
//! Executes vendor requests with a per-call timeout and bounded retry on
//! transient failures

use crate::config::Settings;
use crate::providers::Brand;
use crate::utils::error::helpers::{self, internal_error};
use crate::utils::error::{is_transient_status, AppError, AppResult, ErrorContext};
use reqwest::{Client, Request, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("aicompare/", env!("CARGO_PKG_VERSION"));

/// Timeout and retry policy of one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Regular chat call policy from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.timeout(),
            retries: settings.upstream.retries,
            delay: settings.retry_delay(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Per-brand policy table derived from settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPolicy {
    /// Policy of a regular call
    pub base: RetryPolicy,
    /// Timeout for slow brands and image generation
    pub slow_timeout: Duration,
    pub stream_timeout: Duration,
}

impl UpstreamPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base: RetryPolicy::from_settings(settings),
            slow_timeout: settings.slow_timeout(),
            stream_timeout: settings.stream_timeout(),
        }
    }

    /// Whole-response chat call
    pub fn chat(&self, brand: Brand) -> RetryPolicy {
        if brand.is_slow() {
            self.base.clone().with_timeout(self.slow_timeout)
        } else {
            self.base.clone()
        }
    }

    /// Streaming call, retried only until the response headers arrive
    pub fn stream(&self) -> RetryPolicy {
        self.base.clone().with_timeout(self.stream_timeout)
    }

    /// Image generation, slow brands get one extra attempt
    pub fn images(&self, brand: Brand) -> RetryPolicy {
        let policy = self.base.clone().with_timeout(self.slow_timeout);
        if brand.is_slow() {
            let retries = policy.retries + 1;
            policy.with_retries(retries)
        } else {
            policy
        }
    }

    /// Fetching reference images or model listings
    pub fn fetch(&self) -> RetryPolicy {
        self.chat(Brand::Generic)
    }
}

/// Shared HTTP client used by every adapter
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new() -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| internal_error(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Underlying client for building requests
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request, retrying transient failures, and return a 2xx response
    pub async fn send(&self, builder: RequestBuilder, policy: &RetryPolicy) -> AppResult<Response> {
        let request = builder
            .timeout(policy.timeout)
            .build()
            .bad_request_context("Invalid provider request")?;
        let url = redact_url(request.url());
        let attempts = policy.retries + 1;

        for attempt in 1..=attempts {
            let error = match self.execute_once(&request, &url).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if attempt >= attempts || !error.is_transient() {
                return Err(error);
            }

            warn!(
                "Request to {} failed, retrying after {}ms (attempt {}/{}): {}",
                url,
                policy.delay.as_millis(),
                attempt,
                attempts,
                error
            );
            tokio::time::sleep(policy.delay).await;
        }

        Err(internal_error(format!("No attempt made for {}", url)))
    }

    async fn execute_once(&self, request: &Request, url: &str) -> AppResult<Response> {
        let attempt = request
            .try_clone()
            .ok_or_else(|| internal_error("Request body cannot be retried"))?;

        debug!("Sending provider request: {}", url);
        let response = self.client.execute(attempt).await.map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if is_transient_status(status.as_u16()) {
            debug!("Transient status {} from {}", status, url);
        }
        Err(AppError::provider_http(status.as_u16(), url, body))
    }

    /// Send and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        policy: &RetryPolicy,
    ) -> AppResult<T> {
        let response = self.send(builder, policy).await?;
        read_json(response).await
    }

    /// Fetch raw bytes and the declared content type
    pub async fn fetch_bytes(&self, url: &str, policy: &RetryPolicy) -> AppResult<(Vec<u8>, Option<String>)> {
        let response = self.send(self.client.get(url), policy).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&redact_str(url), e))?;
        Ok((bytes.to_vec(), content_type))
    }
}

/// Decode a successful response body as JSON
pub async fn read_json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    let url = redact_url(response.url());
    let bytes = response.bytes().await.map_err(|e| transport_error(&url, e))?;
    serde_json::from_slice(&bytes).decode_context(&format!("Invalid JSON from {}", url))
}

/// Map a reqwest failure to a transport error
pub fn transport_error(url: &str, error: reqwest::Error) -> AppError {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "request"
    };
    helpers::transport_error(format!("{} error for {}: {}", kind, url, error.without_url()))
}

/// URL with secret query parameters removed, safe for logs and error bodies
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "key")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        redacted.set_query(None);
    } else {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

fn redact_str(url: &str) -> String {
    Url::parse(url).map(|u| redact_url(&u)).unwrap_or_else(|_| url.to_string())
}
