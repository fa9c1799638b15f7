//! Key-value persistence backends.
//!
//! The record store keeps one JSON blob per partition:
//!
//! ```text
//! _rentals       # every listing ever collected
//! _seenRentals   # listings the user hid
//! _favRentals    # listings the user saved
//! ```

pub mod local;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};

pub use local::LocalStorage;

/// Trait for string-blob storage backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a blob; `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace a blob.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Volatile storage, used for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with blobs.
    pub fn with_blobs<I, K, V>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let blobs = blobs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            blobs: Mutex::new(blobs),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| AppError::persistence(key, e))?;
        Ok(blobs.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| AppError::persistence(key, e))?;
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);

        storage.set("k", "v1").await.unwrap();
        storage.set("k", "v2").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v2"));
    }
}
