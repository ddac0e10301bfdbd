//! Storage layer for rate-limit state and statistics
//!
//! Provides JSON-file persistence. Every write goes through one
//! [`JsonFile`], which serializes writers and replaces the file atomically.

use crate::rate_limit::UserRateState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence for per-user rate state, keyed by stringified user id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Load all persisted user states
    async fn load_rates(&self) -> Result<HashMap<String, UserRateState>, StoreError>;
    /// Replace the persisted user states
    async fn save_rates(&self, users: &HashMap<String, UserRateState>) -> Result<(), StoreError>;
}

/// A JSON document on disk
pub struct JsonFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFile {
    /// Create a handle for the JSON document at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the document; a missing file yields `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file exists but cannot be read, or
    /// `StoreError::Json` if its contents are not valid for `T`.
    pub async fn read<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state yet");
                Ok(T::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize `value` and replace the document.
    ///
    /// The data is written to a sibling temp file and renamed over the
    /// target, so readers never observe a partial document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Json` if serialization fails or `StoreError::Io`
    /// if the file cannot be written.
    pub async fn write<T: Serialize + Sync + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let _guard = self.write_lock.lock().await;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for JsonFile {
    async fn load_rates(&self) -> Result<HashMap<String, UserRateState>, StoreError> {
        self.read().await
    }

    async fn save_rates(&self, users: &HashMap<String, UserRateState>) -> Result<(), StoreError> {
        self.write(users).await
    }
}
