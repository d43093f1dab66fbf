//! Local artifact storage
//!
//! Uploaded and generated images are written under one directory and served
//! back at `/uploads/{name}`.

use crate::utils::error::helpers::{bad_request, storage_error};
use crate::utils::error::{AppError, AppResult, ErrorContext};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// URL prefix under which stored files are served
pub const UPLOADS_PREFIX: &str = "/uploads/";

/// Directory-backed artifact store
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the storage directory if missing
    pub async fn ensure_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .storage_context(&format!("Failed to create {}", self.dir.display()))
    }

    /// Write a file and return its `/uploads/` path
    pub async fn save(&self, name: &str, bytes: &[u8]) -> AppResult<String> {
        validate_filename(name)?;
        self.ensure_dir().await?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)
            .await
            .storage_context(&format!("Failed to write {}", path.display()))?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}{}", UPLOADS_PREFIX, name))
    }

    /// Read a stored file by name
    pub async fn read(&self, name: &str) -> AppResult<Vec<u8>> {
        validate_filename(name)?;
        let path = self.dir.join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Stored file not found: {}", name)))
            }
            Err(e) => Err(storage_error(format!("Failed to read {}: {}", path.display(), e))),
        }
    }
}

/// Reject names that could escape the storage directory
pub fn validate_filename(name: &str) -> AppResult<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(bad_request(format!("invalid filename: {}", name)));
    }
    Ok(())
}

/// Stored file name of a `/uploads/...` path, if it is one
pub fn uploads_name(path: &str) -> Option<&str> {
    path.strip_prefix(UPLOADS_PREFIX).filter(|name| !name.is_empty())
}
