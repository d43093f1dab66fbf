//! Configuration and credential loading tests

use aicompare::config::{Credentials, KeySource, KeyValidators, Settings};
use aicompare::services::UpstreamPolicy;
use aicompare::{AppError, Brand};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> =
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_environment_overrides() {
    let settings = Settings::from_lookup(
        lookup(&[
            ("SERVER_HOST", "127.0.0.1"),
            ("SERVER_PORT", "8080"),
            ("REQUEST_TIMEOUT", "12"),
            ("SLOW_REQUEST_TIMEOUT", "90"),
            ("STREAM_TIMEOUT", "120"),
            ("RETRY_COUNT", "3"),
            ("RETRY_DELAY_MS", "250"),
            ("UPLOADS_DIR", "/var/data/uploads"),
            ("MAX_REQUEST_SIZE", "1048576"),
            ("CORS_ORIGIN", "https://a.example.com, https://b.example.com"),
            ("LOG_FORMAT", "json"),
            ("APP_ENV", "production"),
        ]),
        &[],
    )
    .unwrap();

    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.timeout(), Duration::from_secs(12));
    assert_eq!(settings.slow_timeout(), Duration::from_secs(90));
    assert_eq!(settings.stream_timeout(), Duration::from_secs(120));
    assert_eq!(settings.upstream.retries, 3);
    assert_eq!(settings.retry_delay(), Duration::from_millis(250));
    assert_eq!(settings.uploads.dir, PathBuf::from("/var/data/uploads"));
    assert_eq!(settings.request.max_request_size, 1048576);
    assert_eq!(
        settings.security.allowed_origins,
        vec!["https://a.example.com".to_string(), "https://b.example.com".to_string()]
    );
    assert_eq!(settings.logging.format, "json");
    assert!(settings.is_production());
    assert!(!settings.is_dev_mode());
}

#[test]
fn test_blank_variables_are_ignored() {
    let settings = Settings::from_lookup(lookup(&[("PORT", "  "), ("UPLOADS_DIR", "")]), &[]).unwrap();
    assert_eq!(settings.server.port, 3001);
    assert_eq!(settings.uploads.dir, PathBuf::from("./uploads"));
}

#[test]
fn test_public_origin_is_trimmed() {
    let settings =
        Settings::from_lookup(lookup(&[("PUBLIC_SERVER_ORIGIN", "https://gw.example.com/")]), &[]).unwrap();
    assert_eq!(settings.fallback_origin(), "https://gw.example.com");
}

#[test]
fn test_config_file_then_environment() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
environment = "staging"

[server]
port = 7000

[upstream]
retries = 2

[logging]
level = "debug"
"#
    )
    .unwrap();
    let files = vec![file.path().to_path_buf()];

    let settings = Settings::from_lookup(lookup(&[]), &files).unwrap();
    assert_eq!(settings.server.port, 7000);
    assert_eq!(settings.upstream.retries, 2);
    assert_eq!(settings.logging.level, "debug");
    assert_eq!(settings.environment, "staging");

    let settings = Settings::from_lookup(lookup(&[("PORT", "7100")]), &files).unwrap();
    assert_eq!(settings.server.port, 7100);
}

#[test]
fn test_missing_config_file_is_optional() {
    let files = vec![PathBuf::from("/nonexistent/aicompare.toml")];
    assert!(Settings::from_lookup(lookup(&[]), &files).is_ok());
}

#[test]
fn test_invalid_models_url() {
    let result = Settings::from_lookup(lookup(&[("OPENROUTER_MODELS_URL", "ftp://x")]), &[]);
    assert!(result.is_err());
}

#[test]
fn test_upstream_policy_from_settings() {
    let settings = Settings::from_lookup(
        lookup(&[("REQUEST_TIMEOUT", "10"), ("SLOW_REQUEST_TIMEOUT", "40"), ("RETRY_COUNT", "2")]),
        &[],
    )
    .unwrap();
    let policy = UpstreamPolicy::from_settings(&settings);

    assert_eq!(policy.chat(Brand::OpenAI).timeout, Duration::from_secs(10));
    assert_eq!(policy.chat(Brand::Doubao).timeout, Duration::from_secs(40));
    assert_eq!(policy.images(Brand::OpenAI).retries, 2);
    assert_eq!(policy.images(Brand::Doubao).retries, 3);
    assert_eq!(policy.fetch().timeout, Duration::from_secs(10));
}

#[test]
fn test_credentials_per_brand_variables() {
    let credentials = Credentials::from_lookup(lookup(&[
        ("OPENAI_API_KEY", "sk-openai"),
        ("DASHSCOPE_API_KEY", "qw-key"),
        ("GOOGLE_API_KEY", "AIza-google"),
        ("GEMINI_API_KEY", "AIza-gemini"),
        ("ANTHROPIC_API_KEY", ""),
    ]));

    assert_eq!(
        credentials.configured_brands(),
        vec![Brand::OpenAI, Brand::Qianwen, Brand::Gemini]
    );
    let (key, source) = credentials.resolve(Brand::Gemini, None, false).unwrap();
    assert_eq!(key, "AIza-google");
    assert_eq!(source, KeySource::Brand);
    assert!(matches!(
        credentials.resolve(Brand::Anthropic, None, true),
        Err(AppError::MissingCredential { brand: Brand::Anthropic })
    ));
}

#[test]
fn test_compat_fallback_only_when_allowed() {
    let credentials = Credentials::from_lookup(lookup(&[("OPENAI_COMPAT_API_KEY", "compat-key")]));

    let (key, source) = credentials.resolve(Brand::Generic, None, true).unwrap();
    assert_eq!(key, "compat-key");
    assert_eq!(source, KeySource::CompatFallback);
    assert!(credentials.resolve(Brand::Gemini, None, false).is_err());
}

#[test]
fn test_custom_validator_rule() {
    let validators = KeyValidators::none().with_rule(Brand::Qianwen, r"^test-").unwrap();
    let credentials = Credentials::new()
        .with_validators(validators)
        .with_key(Brand::Qianwen, "env-qw");

    let (key, source) = credentials.resolve(Brand::Qianwen, Some("test-123"), true).unwrap();
    assert_eq!(key, "env-qw");
    assert_eq!(source, KeySource::Brand);

    let (key, source) = credentials.resolve(Brand::Qianwen, Some("sk-real"), true).unwrap();
    assert_eq!(key, "sk-real");
    assert_eq!(source, KeySource::Inline);

    // without the default rules a Doubao key shaped like an OpenAI key is accepted
    let (key, _) = credentials.resolve(Brand::Doubao, Some("sk-abc"), false).unwrap();
    assert_eq!(key, "sk-abc");

    assert!(KeyValidators::none().with_rule(Brand::Qianwen, "(").is_err());
}
