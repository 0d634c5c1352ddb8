//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── {group}_{topic}.json              # Current document per topic
//! └── {group}_{topic}_{updated}.json    # Legacy naming, removed on save
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Topic;
use crate::storage::TopicStorage;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root_dir: PathBuf,
    group_id: i64,
}

impl FileStorage {
    /// Create a FileStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>, group_id: i64) -> Self {
        Self {
            root_dir: root_dir.into(),
            group_id,
        }
    }

    /// Create the storage and its root directory.
    pub async fn create(root_dir: impl Into<PathBuf>, group_id: i64) -> Result<Self> {
        let storage = Self::new(root_dir, group_id);
        tokio::fs::create_dir_all(&storage.root_dir).await?;
        Ok(storage)
    }

    /// File name of a topic document.
    fn topic_key(&self, topic_id: i64) -> String {
        format!("{}_{}.json", self.group_id, topic_id)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                AppError::storage(format!("could not decode {key}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Whether `name` is a legacy `{group}_{topic}_{updated}.json` file.
    fn is_superseded(&self, name: &str, topic_id: i64) -> bool {
        let prefix = format!("{}_{}_", self.group_id, topic_id);
        name.strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .is_some_and(|marker| {
                !marker.is_empty() && marker.bytes().all(|b| b.is_ascii_digit())
            })
    }

    /// Delete documents written under the legacy naming scheme.
    async fn remove_superseded(&self, topic_id: i64) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.is_superseded(name, topic_id) {
                tokio::fs::remove_file(entry.path()).await?;
                log::debug!("Removed superseded file {}", name);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl TopicStorage for FileStorage {
    async fn find(&self, topic_id: i64) -> Result<Option<Topic>> {
        self.read_json(&self.topic_key(topic_id)).await
    }

    async fn save(&self, topic: &Topic) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        self.remove_superseded(topic.id).await?;
        self.write_json(&self.topic_key(topic.id), topic).await?;
        log::debug!(
            "Saved topic {} to {}",
            topic.id,
            self.path(&self.topic_key(topic.id)).display()
        );
        Ok(())
    }
}
