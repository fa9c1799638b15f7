//! Local filesystem storage.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml
//! ├── _rentals.json
//! ├── _seenRentals.json
//! └── _favRentals.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::KeyValueStore;

/// One JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(format!("{key}.json"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl KeyValueStore for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::persistence(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key);
        self.write_bytes(&path, value.as_bytes())
            .await
            .map_err(|e| AppError::persistence(key, e))
    }
}
