//! Configuration management module
//!
//! Responsible for loading server settings and the vendor credential snapshot

pub mod credentials;
pub mod settings;

pub use credentials::{normalize_key, Credentials, KeySource, KeyValidators};
pub use settings::Settings;
