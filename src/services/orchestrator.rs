//! Fan-out orchestrator
//!
//! Dispatches one prompt to many providers at once. Every provider call is
//! timed and fault-isolated on its own: a failing provider yields an
//! `ok:false` result or an `error` event for its id and never disturbs the
//! others.

use crate::models::{
    now_millis, CompareRequest, CompareResult, NormalizedRequest, ProviderConfig, ProviderEvent,
    StreamEvent, Timings,
};
use crate::providers::ProviderRegistry;
use crate::utils::error::helpers::bad_request;
use crate::utils::error::AppResult;
use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const STREAM_BUFFER: usize = 100;

/// A validated compare request
#[derive(Debug, Clone)]
pub struct CompareJob {
    pub prompt: String,
    pub system: Option<String>,
    pub providers: Vec<ProviderConfig>,
}

impl CompareJob {
    /// Validate a raw request body
    pub fn validate(request: CompareRequest) -> AppResult<Self> {
        let prompt = request
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| bad_request("bad request: missing prompt"))?;
        let providers = request
            .providers
            .filter(|p| !p.is_empty())
            .ok_or_else(|| bad_request("bad request: missing providers"))?;
        Ok(Self {
            prompt,
            system: request.system,
            providers,
        })
    }

    /// Request for one provider; its `params.system` wins over the request system
    pub fn request_for(&self, config: &ProviderConfig) -> NormalizedRequest {
        let system = config
            .params
            .system
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.system.clone());
        NormalizedRequest::new(self.prompt.clone()).with_system(system)
    }
}

/// Concurrent dispatcher over the provider registry
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run every provider concurrently; results keep the input order
    pub async fn compare(&self, job: &CompareJob) -> Vec<CompareResult> {
        info!("Comparing {} providers", job.providers.len());
        let calls = job
            .providers
            .iter()
            .map(|config| self.run_one(config, job.request_for(config)));
        join_all(calls).await
    }

    /// One provider call captured as a result
    pub async fn run_one(&self, config: &ProviderConfig, request: NormalizedRequest) -> CompareResult {
        let start = now_millis();
        let outcome = match self.registry.get(&config.provider_type) {
            Ok(provider) => provider.run(config, &request).await,
            Err(e) => Err(e),
        };
        let timings = Timings::since(start);

        match outcome {
            Ok(completion) => {
                debug!("Provider {} finished in {}ms", config.id, timings.duration_ms);
                CompareResult {
                    id: config.id.clone(),
                    name: config.name.clone(),
                    ok: true,
                    output: Some(completion.output),
                    error: None,
                    usage: completion.usage,
                    timings,
                }
            }
            Err(e) => {
                warn!("Provider {} failed after {}ms: {}", config.id, timings.duration_ms, e);
                CompareResult {
                    id: config.id.clone(),
                    name: config.name.clone(),
                    ok: false,
                    output: None,
                    error: Some(e.to_string()),
                    usage: None,
                    timings,
                }
            }
        }
    }

    /// Stream every provider concurrently into one event sequence
    ///
    /// Each provider emits `start`, its deltas and usage in arrival order,
    /// then exactly one `done` or `error`. The returned stream ends once
    /// every provider has emitted its terminal event.
    pub fn compare_stream(&self, job: CompareJob) -> ReceiverStream<StreamEvent> {
        info!("Streaming {} providers", job.providers.len());
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        for config in &job.providers {
            let request = job.request_for(config);
            let start = now_millis();
            let task = tokio::spawn(stream_one(
                self.registry.clone(),
                config.clone(),
                request,
                tx.clone(),
                start,
            ));

            // A panicking adapter still owes its provider a terminal event
            let config = config.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    warn!("Provider {} stream task aborted: {}", config.id, e);
                    let aborted = StreamEvent::Error {
                        id: config.id,
                        name: config.name,
                        ok: false,
                        error: format!("provider task aborted: {}", e),
                        timings: Timings::since(start),
                    };
                    let _ = tx.send(aborted).await;
                }
            });
        }

        ReceiverStream::new(rx)
    }
}

async fn stream_one(
    registry: Arc<ProviderRegistry>,
    config: ProviderConfig,
    request: NormalizedRequest,
    tx: mpsc::Sender<StreamEvent>,
    start: i64,
) {
    let started = StreamEvent::Start {
        id: config.id.clone(),
        name: config.name.clone(),
        t: start,
    };
    if tx.send(started).await.is_err() {
        return;
    }

    let terminal = match forward_events(&registry, &config, &request, &tx).await {
        Ok(Some(output)) => StreamEvent::Done {
            id: config.id.clone(),
            name: config.name.clone(),
            ok: true,
            output,
            timings: Timings::since(start),
        },
        Ok(None) => {
            debug!("Client disconnected during {} stream", config.id);
            return;
        }
        Err(e) => {
            warn!("Provider {} stream failed: {}", config.id, e);
            StreamEvent::Error {
                id: config.id.clone(),
                name: config.name.clone(),
                ok: false,
                error: e.to_string(),
                timings: Timings::since(start),
            }
        }
    };
    let _ = tx.send(terminal).await;
}

/// Forward one provider's events, returning the accumulated output
///
/// `Ok(None)` means the receiver went away.
async fn forward_events(
    registry: &ProviderRegistry,
    config: &ProviderConfig,
    request: &NormalizedRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> AppResult<Option<String>> {
    let provider = registry.get(&config.provider_type)?;
    let mut events = provider.stream(config, request).await?;
    let mut output = String::new();

    while let Some(event) = events.next().await {
        let outbound = match event? {
            ProviderEvent::Delta(delta) => {
                output.push_str(&delta);
                StreamEvent::Delta {
                    id: config.id.clone(),
                    delta,
                }
            }
            ProviderEvent::Usage(usage) => StreamEvent::Usage {
                id: config.id.clone(),
                usage,
            },
            ProviderEvent::Done => break,
        };
        if tx.send(outbound).await.is_err() {
            return Ok(None);
        }
    }
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderType;
    use crate::utils::error::AppError;

    fn provider(id: &str, system: Option<&str>) -> ProviderConfig {
        let mut config = ProviderConfig::new(id, ProviderType::OpenAICompat);
        config.params.system = system.map(str::to_string);
        config
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let missing_prompt = CompareRequest {
            prompt: Some("   ".to_string()),
            providers: Some(vec![provider("a", None)]),
            ..Default::default()
        };
        assert!(matches!(CompareJob::validate(missing_prompt), Err(AppError::BadRequest(_))));

        let empty_providers = CompareRequest {
            prompt: Some("hi".to_string()),
            providers: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(CompareJob::validate(empty_providers), Err(AppError::BadRequest(_))));

        let missing_providers = CompareRequest {
            prompt: Some("hi".to_string()),
            ..Default::default()
        };
        assert!(CompareJob::validate(missing_providers).is_err());
    }

    #[test]
    fn test_provider_system_overrides_request_system() {
        let job = CompareJob::validate(CompareRequest {
            prompt: Some("hi".to_string()),
            system: Some("global".to_string()),
            providers: Some(vec![provider("a", Some("local")), provider("b", None), provider("c", Some(" "))]),
        })
        .unwrap();

        assert_eq!(job.request_for(&job.providers[0]).system.as_deref(), Some("local"));
        assert_eq!(job.request_for(&job.providers[1]).system.as_deref(), Some("global"));
        assert_eq!(job.request_for(&job.providers[2]).system.as_deref(), Some("global"));
    }
}
