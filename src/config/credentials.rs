//! Per-brand API key resolution
//!
//! Keys are read once into a [`Credentials`] snapshot and handed to the
//! adapters, so no adapter reads the process environment at call time.

use crate::providers::Brand;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::mask_key;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Generic fallback consulted by the OpenAI-compatible adapter only
pub const COMPAT_FALLBACK_ENV: &str = "OPENAI_COMPAT_API_KEY";

static OPENAI_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^sk-[A-Za-z0-9]").expect("valid regex"));
static GOOGLE_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^AIza[\w-]+").expect("valid regex"));
static KEY_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r":").expect("valid regex"));
static ACCESS_KEY_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)AKID|SK|AK\w{6,}").expect("valid regex"));

/// Strip surrounding quotes and all whitespace from a key
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    trimmed.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Brand-specific rules that reject structurally wrong inline keys
#[derive(Debug, Clone, Default)]
pub struct KeyValidators {
    rules: HashMap<Brand, Vec<Regex>>,
}

impl KeyValidators {
    /// No rules, every inline key is accepted
    pub fn none() -> Self {
        Self::default()
    }

    /// Known key-shape mismatches for Doubao and Gemini
    pub fn defaults() -> Self {
        Self::none()
            .with_regex(Brand::Doubao, OPENAI_SHAPED.clone())
            .with_regex(Brand::Doubao, GOOGLE_SHAPED.clone())
            .with_regex(Brand::Doubao, KEY_PAIR.clone())
            .with_regex(Brand::Doubao, ACCESS_KEY_HINT.clone())
            .with_regex(Brand::Gemini, OPENAI_SHAPED.clone())
    }

    /// Add a rejection pattern for a brand
    pub fn with_rule(self, brand: Brand, pattern: &str) -> Result<Self, regex::Error> {
        Ok(self.with_regex(brand, Regex::new(pattern)?))
    }

    fn with_regex(mut self, brand: Brand, regex: Regex) -> Self {
        self.rules.entry(brand).or_default().push(regex);
        self
    }

    /// Whether an inline key must be ignored for this brand
    pub fn rejects(&self, brand: Brand, key: &str) -> bool {
        self.rules
            .get(&brand)
            .map(|rules| rules.iter().any(|r| r.is_match(key.trim())))
            .unwrap_or(false)
    }
}

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Inline,
    Brand,
    CompatFallback,
}

/// Read-only key snapshot
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<Brand, String>,
    compat_fallback: Option<String>,
    validators: KeyValidators,
}

impl Credentials {
    /// Empty snapshot with the default validators
    pub fn new() -> Self {
        Self {
            validators: KeyValidators::defaults(),
            ..Default::default()
        }
    }

    /// Snapshot of the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Snapshot from an injected variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| normalize_key(&v)).filter(|v| !v.is_empty());

        let mut credentials = Self::new();
        for brand in Brand::ALL {
            if let Some(key) = brand.env_vars().iter().find_map(|var| read(var)) {
                credentials.keys.insert(brand, key);
            }
        }
        credentials.compat_fallback = read(COMPAT_FALLBACK_ENV);
        credentials
    }

    pub fn with_key(mut self, brand: Brand, key: impl AsRef<str>) -> Self {
        self.keys.insert(brand, normalize_key(key.as_ref()));
        self
    }

    pub fn with_compat_fallback(mut self, key: impl AsRef<str>) -> Self {
        self.compat_fallback = Some(normalize_key(key.as_ref()));
        self
    }

    pub fn with_validators(mut self, validators: KeyValidators) -> Self {
        self.validators = validators;
        self
    }

    /// Brands that have an environment key configured
    pub fn configured_brands(&self) -> Vec<Brand> {
        Brand::ALL.into_iter().filter(|b| self.keys.contains_key(b)).collect()
    }

    /// Resolve the key for a call: a valid inline key wins, then the
    /// brand key, then the compatible fallback when allowed
    pub fn resolve(
        &self,
        brand: Brand,
        inline: Option<&str>,
        allow_compat_fallback: bool,
    ) -> AppResult<(String, KeySource)> {
        let inline = inline.map(normalize_key).filter(|k| !k.is_empty());

        if let Some(key) = inline {
            if self.validators.rejects(brand, &key) {
                warn!(
                    "Ignoring invalid inline key for {}, using environment key instead: {}",
                    brand,
                    mask_key(&key)
                );
            } else {
                return Ok((key, KeySource::Inline));
            }
        }

        if let Some(key) = self.keys.get(&brand) {
            debug!("Using environment key for {}", brand);
            return Ok((key.clone(), KeySource::Brand));
        }

        if allow_compat_fallback {
            if let Some(key) = &self.compat_fallback {
                debug!("Using compatible fallback key for {}", brand);
                return Ok((key.clone(), KeySource::CompatFallback));
            }
        }

        warn!("Missing API key for {}", brand);
        Err(AppError::MissingCredential { brand })
    }
}
