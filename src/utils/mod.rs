//! Utilities module
//!
//! Contains error handling, URL helpers and logging tools

pub mod data_url;
pub mod error;
pub mod logging;
pub mod url;
