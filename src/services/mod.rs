//! Service layer module
//!
//! Contains the HTTP transport, fan-out orchestrator, content resolver and
//! artifact storage

pub mod content;
pub mod image_host;
pub mod orchestrator;
pub mod storage;
pub mod transport;

pub use content::ContentResolver;
pub use image_host::{ImageHost, NoImageHost};
pub use orchestrator::{CompareJob, Orchestrator};
pub use storage::LocalStore;
pub use transport::{HttpTransport, RetryPolicy, UpstreamPolicy};
