//! Data models module
//!
//! Defines the vendor-agnostic request, result and event structures

pub mod provider;
pub mod request;
pub mod result;

pub use provider::{ProviderConfig, ProviderParams, ProviderType};
pub use request::{CompareRequest, ContentPart, ImageRequest, ImageUrl, NormalizedRequest};
pub use result::{
    now_millis, CompareResult, Completion, GeneratedImage, ProviderEvent, StreamEvent, Timings,
    Usage,
};
