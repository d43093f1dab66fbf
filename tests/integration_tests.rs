//! Integration tests
//!
//! Drive the full router in-process with mock adapters behind it

use aicompare::handlers::{create_router_with_state, AppState};
use aicompare::models::{
    Completion, GeneratedImage, ImageRequest, NormalizedRequest, ProviderConfig, ProviderEvent,
    ProviderType, Usage,
};
use aicompare::providers::{BoxStream, Provider, ProviderRegistry};
use aicompare::services::NoImageHost;
use aicompare::config::KeyValidators;
use aicompare::{AppError, AppResult, Brand, Credentials, Settings};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Echoes what it was asked so the routes' request shaping can be checked
struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn run(&self, config: &ProviderConfig, request: &NormalizedRequest) -> AppResult<Completion> {
        if config.params.model.as_deref() == Some("fail") {
            return Err(AppError::provider_http(502, "https://mock.test/chat/completions", "upstream broke"));
        }
        let images: Vec<&str> = request.image_urls().collect();
        Ok(Completion {
            output: json!({
                "prompt": request.prompt,
                "system": request.system,
                "images": images,
                "path": config.params.path,
            })
            .to_string(),
            usage: Some(Usage::new(2, 3)),
        })
    }

    async fn stream(
        &self,
        _config: &ProviderConfig,
        _request: &NormalizedRequest,
    ) -> AppResult<BoxStream<'static, ProviderEvent>> {
        let events = vec![
            Ok(ProviderEvent::Delta("he".to_string())),
            Ok(ProviderEvent::Delta("llo".to_string())),
            Ok(ProviderEvent::Done),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn run_images(&self, config: &ProviderConfig, request: &ImageRequest) -> AppResult<GeneratedImage> {
        match config.params.model.as_deref() {
            Some("url") => Ok(GeneratedImage::Url(format!(
                "https://cdn.mock.test/out.png?refs={}",
                request.images.join(",")
            ))),
            _ => Ok(GeneratedImage::B64("aGVsbG8=".to_string())),
        }
    }
}

struct TestApp {
    router: Router,
    dir: TempDir,
}

fn test_app(vars: &[(&str, &str)]) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.insert("UPLOADS_DIR".to_string(), dir.path().display().to_string());
    env.entry("RETRY_DELAY_MS".to_string()).or_insert_with(|| "10".to_string());
    let settings = Settings::from_lookup(|key| env.get(key).cloned(), &[]).unwrap();

    let echo: Arc<dyn Provider> = Arc::new(EchoProvider);
    let registry = ProviderRegistry::empty()
        .with(ProviderType::OpenAICompat, echo.clone())
        .with(ProviderType::Anthropic, echo.clone())
        .with(ProviderType::Gemini, echo);
    let state = AppState::with_registry(settings, registry, Arc::new(NoImageHost)).unwrap();

    TestApp {
        router: create_router_with_state(Arc::new(state)),
        dir,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::HOST, "gateway.test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn provider(id: &str) -> Value {
    json!({"id": id, "name": id.to_uppercase(), "type": "openai-compat", "params": {"model": "m"}})
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let app = test_app(&[]);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "aicompare");
    assert!(health["version"].is_string());
    assert_eq!(health["details"]["adapters"], json!(["anthropic", "gemini", "openai-compat"]));
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let app = test_app(&[]);
    let request = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "alive");
    assert!(health.get("details").is_none());
}

#[tokio::test]
async fn test_compare_missing_prompt() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json("/compare", json!({"providers": [provider("a")]})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad request: missing prompt");
}

#[tokio::test]
async fn test_compare_missing_providers() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json("/compare", json!({"prompt": "hi", "providers": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad request: missing providers");
}

#[tokio::test]
async fn test_compare_malformed_json() {
    let app = test_app(&[]);
    let request = Request::builder()
        .method("POST")
        .uri("/compare")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("bad request"));
}

#[tokio::test]
async fn test_compare_under_api_prefix() {
    let app = test_app(&[]);
    let mut failing = provider("b");
    failing["params"]["model"] = json!("fail");
    let response = app
        .router
        .oneshot(post_json(
            "/api/compare",
            json!({"prompt": "hi", "system": "sys", "providers": [provider("a"), failing]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let results = body_json(response).await;
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);

    assert_eq!(results[0]["id"], "a");
    assert_eq!(results[0]["ok"], true);
    let echoed: Value = serde_json::from_str(results[0]["output"].as_str().unwrap()).unwrap();
    assert_eq!(echoed["prompt"], "hi");
    assert_eq!(echoed["system"], "sys");
    assert_eq!(results[0]["usage"]["total_tokens"], 5);
    assert!(results[0]["timings"]["durationMs"].is_number());

    assert_eq!(results[1]["id"], "b");
    assert_eq!(results[1]["ok"], false);
    assert_eq!(results[1]["usage"], Value::Null);
    assert!(results[1]["error"].as_str().unwrap().contains("upstream broke"));
}

#[tokio::test]
async fn test_compare_stream_ndjson() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json(
            "/compare/stream",
            json!({"prompt": "hi", "providers": [provider("a"), provider("b")]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-ndjson; charset=utf-8"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.ends_with('\n'));
    let events: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    for id in ["a", "b"] {
        let own: Vec<&Value> = events.iter().filter(|e| e["id"] == id).collect();
        assert_eq!(own.first().unwrap()["type"], "start");
        let last = own.last().unwrap();
        assert_eq!(last["type"], "done");
        assert_eq!(last["output"], "hello");
        assert_eq!(last["ok"], true);
        assert_eq!(own.iter().filter(|e| e["type"] == "delta").count(), 2);
    }
}

#[tokio::test]
async fn test_compare_stream_validation_is_plain_json() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json("/compare/stream", json!({"prompt": "hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad request: missing providers");
}

#[tokio::test]
async fn test_upload_missing_data_url() {
    let app = test_app(&[]);
    let response = app.router.oneshot(post_json("/upload", json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "missing dataUrl");
}

#[tokio::test]
async fn test_upload_stores_and_serves_file() {
    let app = test_app(&[]);
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/upload",
            json!({"dataUrl": "data:image/png;base64,aGVsbG8=", "filename": "room.png"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["localUrl"], "http://gateway.test/uploads/room.png");
    assert_eq!(body["url"], body["localUrl"]);
    assert_eq!(body["hosted"], false);
    assert_eq!(body["host"], "none");
    assert_eq!(std::fs::read(app.dir.path().join("room.png")).unwrap(), b"hello");

    let request = Request::builder().uri("/uploads/room.png").body(Body::empty()).unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"hello");
}

#[tokio::test]
async fn test_upload_generates_name() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json("/api/upload", json!({"dataUrl": "data:image/jpeg;base64,aGVsbG8="})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let local = body["localUrl"].as_str().unwrap();
    assert!(local.starts_with("http://gateway.test/uploads/upload_"));
    assert!(local.ends_with(".jpg"));
}

#[tokio::test]
async fn test_analyze_requires_image() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json("/fengshui/analyze-image", json!({"provider": provider("a")})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "missing imageUrl or imageDataUrl");
}

#[tokio::test]
async fn test_analyze_absolutizes_local_image() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json(
            "/fengshui/analyze-image",
            json!({"imageUrl": "/uploads/room.png", "provider": provider("a")}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let output: Value = serde_json::from_str(body_json(response).await["output"].as_str().unwrap()).unwrap();
    assert_eq!(output["images"], json!(["http://gateway.test/uploads/room.png"]));
    assert!(!output["system"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_advise_forces_chat_path() {
    let app = test_app(&[]);
    let mut config = provider("doubao");
    config["params"]["path"] = json!("/images/generations");
    let response = app
        .router
        .oneshot(post_json(
            "/fengshui/advise",
            json!({"imageElements": {"elements": ["sofa"]}, "provider": config}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let output: Value = serde_json::from_str(body_json(response).await["output"].as_str().unwrap()).unwrap();
    assert_eq!(output["path"], "/chat/completions");
    assert!(output["prompt"].as_str().unwrap().contains("sofa"));
}

#[tokio::test]
async fn test_advise_exposes_debug_outside_production() {
    let mut config = provider("a");
    config["params"]["model"] = json!("fail");
    let body = json!({"imageElements": "sofa", "provider": config});

    let app = test_app(&[]);
    let response = app.router.oneshot(post_json("/fengshui/advise", body.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error = body_json(response).await;
    assert_eq!(error["debug"]["providerUrl"], "https://mock.test/chat/completions");
    assert_eq!(error["debug"]["providerResponse"], "upstream broke");

    let app = test_app(&[("APP_ENV", "production")]);
    let response = app.router.oneshot(post_json("/fengshui/advise", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error = body_json(response).await;
    assert!(error.get("debug").is_none());
    assert!(error["error"].as_str().unwrap().contains("HTTP 502"));
}

#[tokio::test]
async fn test_generate_ref_gemini_echoes_original() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json(
            "/fengshui/generate-ref",
            json!({
                "originalImageUrl": "/uploads/room.png",
                "provider": {"id": "gemini", "type": "gemini", "params": {}}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["imageUrl"], "/uploads/room.png");
}

#[tokio::test]
async fn test_generate_ref_stores_inline_result() {
    let app = test_app(&[]);
    let response = app
        .router
        .oneshot(post_json(
            "/fengshui/generate-ref",
            json!({
                "originalImageUrl": "/uploads/room.png",
                "itemsToAdd": [{"item": "plant", "direction": "east"}],
                "provider": provider("a")
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let url = body_json(response).await["imageUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("http://gateway.test/uploads/gen_"));
    let name = url.rsplit('/').next().unwrap();
    assert_eq!(std::fs::read(app.dir.path().join(name)).unwrap(), b"hello");
}

#[tokio::test]
async fn test_generate_ref_doubao_retries_without_unreachable_reference() {
    let server = MockServer::start_async().await;
    let with_reference = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/images/generations")
                .header("authorization", "Bearer ark-key")
                .json_body_partial(r#"{"image": ["https://cdn.example.com/room.png"], "response_format": "url"}"#);
            then.status(400)
                .body(r#"{"error":{"code":"InvalidParameter","message":"Error while downloading the image"}}"#);
        })
        .await;
    let without_reference = server
        .mock_async(|when, then| {
            when.method(POST).path("/images/generations").json_body(json!({
                "prompt": "add a plant",
                "model": "doubao-seedream",
                "size": "2K",
                "response_format": "b64_json"
            }));
            then.status(200).json_body(json!({"data": [{"b64_json": "aGVsbG8="}]}));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let uploads = dir.path().display().to_string();
    let settings = Settings::from_lookup(
        |key| match key {
            "UPLOADS_DIR" => Some(uploads.clone()),
            "RETRY_DELAY_MS" => Some("10".to_string()),
            _ => None,
        },
        &[],
    )
    .unwrap();
    let credentials = Credentials::new()
        .with_validators(KeyValidators::none())
        .with_key(Brand::Doubao, "ark-key");
    let state = AppState::new(settings, credentials).unwrap();
    let router = create_router_with_state(Arc::new(state));

    let response = router
        .oneshot(post_json(
            "/fengshui/generate-ref",
            json!({
                "originalImageUrl": "https://cdn.example.com/room.png",
                "prompt": "add a plant",
                "provider": {
                    "id": "doubao",
                    "name": "Doubao",
                    "type": "openai-compat",
                    "params": {"baseURL": server.base_url(), "model": "doubao-seedream"}
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    with_reference.assert_hits_async(1).await;
    without_reference.assert_hits_async(1).await;

    let url = body_json(response).await["imageUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("http://gateway.test/uploads/gen_"));
    assert!(url.ends_with(".png"));
    let name = url.rsplit('/').next().unwrap();
    assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), b"hello");
}

#[tokio::test]
async fn test_generate_ref_passes_absolute_reference() {
    let app = test_app(&[]);
    let mut config = provider("a");
    config["params"]["model"] = json!("url");
    let response = app
        .router
        .oneshot(post_json(
            "/fengshui/generate-ref",
            json!({"originalImageUrl": "/uploads/room.png", "provider": config}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["imageUrl"],
        "https://cdn.mock.test/out.png?refs=http://gateway.test/uploads/room.png"
    );
}

#[tokio::test]
async fn test_openrouter_models() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/models");
            then.status(200).json_body(json!({"data": [
                {"id": "openai/gpt-4o", "name": "GPT-4o", "context_length": 128000},
                {"id": "meta-llama/llama-3-8b"}
            ]}));
        })
        .await;

    let url = server.url("/api/v1/models");
    let app = test_app(&[("OPENROUTER_MODELS_URL", url.as_str())]);
    let request = Request::builder().uri("/openrouter/models").body(Body::empty()).unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"data": [
            {"id": "openai/gpt-4o", "name": "GPT-4o", "provider": "openai", "context_length": 128000},
            {"id": "meta-llama/llama-3-8b", "name": "meta-llama/llama-3-8b", "provider": "meta-llama", "context_length": null}
        ]})
    );
}

#[tokio::test]
async fn test_openrouter_forwards_upstream_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(404).body("no such list");
        })
        .await;

    let url = server.url("/models");
    let app = test_app(&[("OPENROUTER_MODELS_URL", url.as_str())]);
    let request = Request::builder().uri("/api/openrouter/models").body(Body::empty()).unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "no such list"}));
}

#[tokio::test]
async fn test_request_body_limit() {
    let app = test_app(&[("MAX_REQUEST_SIZE", "64")]);
    let body = json!({"prompt": "x".repeat(1024), "providers": [provider("a")]}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/compare")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Payload too large"));
}

#[tokio::test]
async fn test_request_within_body_limit() {
    let app = test_app(&[("MAX_REQUEST_SIZE", "4096")]);
    let body = json!({"prompt": "hi", "providers": [provider("a")]}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/compare")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
