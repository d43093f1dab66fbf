//! Compare handlers
//!
//! POST /compare fans a prompt out and returns every result at once;
//! POST /compare/stream returns the merged event sequence as NDJSON.

use super::{reject_json, AppState};
use crate::models::{CompareRequest, CompareResult};
use crate::services::CompareJob;
use crate::utils::error::helpers::internal_error;
use crate::utils::error::AppResult;
use crate::utils::logging::create_provider_log_summary;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Content type of the streaming response
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

fn parse_job(payload: Result<Json<CompareRequest>, JsonRejection>) -> AppResult<CompareJob> {
    let Json(request) = payload.map_err(reject_json)?;
    let job = CompareJob::validate(request)?;
    for config in &job.providers {
        debug!("Compare provider: {}", create_provider_log_summary(config));
    }
    Ok(job)
}

/// POST /compare
pub async fn compare(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> AppResult<Json<Vec<CompareResult>>> {
    let job = parse_job(payload)?;
    Ok(Json(state.orchestrator.compare(&job).await))
}

/// POST /compare/stream
pub async fn compare_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> AppResult<Response> {
    let job = parse_job(payload)?;
    let lines = state
        .orchestrator
        .compare_stream(job)
        .inspect(|event| {
            if event.is_terminal() {
                debug!("Provider {} reached its terminal event", event.id());
            }
        })
        .map(|event| event.to_ndjson());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(lines))
        .map_err(|e| internal_error(format!("Failed to build stream response: {}", e)))
}
