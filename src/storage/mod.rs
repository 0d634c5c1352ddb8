//! Storage abstractions for topic persistence.
//!
//! Every backend implements [`TopicStorage`]; the pipeline only ever holds an
//! `Arc<dyn TopicStorage>` built by [`open`] from a destination descriptor.
//!
//! ## Destinations
//!
//! ```text
//! file://backup          # one JSON document per topic
//! sqlite://backup.db     # normalized tables with foreign keys
//! sqlite::memory:        # throwaway relational store
//! ```

pub mod local;
pub mod sql;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Topic;

// Re-export for convenience
pub use local::FileStorage;
pub use sql::SqlStorage;

/// Trait for topic storage backends.
///
/// Implementations must tolerate concurrent calls for different topic ids.
#[async_trait]
pub trait TopicStorage: Send + Sync {
    /// Look up a stored topic, `None` when it was never saved.
    async fn find(&self, topic_id: i64) -> Result<Option<Topic>>;

    /// Insert or fully replace a topic.
    async fn save(&self, topic: &Topic) -> Result<()>;
}

/// Parsed destination descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Sqlite(String),
}

impl Destination {
    /// Parse a `file://` or `sqlite:` descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        if let Some(path) = descriptor.strip_prefix("file://") {
            if path.is_empty() {
                return Err(AppError::config("file:// destination needs a directory"));
            }
            return Ok(Destination::File(PathBuf::from(path)));
        }
        if descriptor.starts_with("sqlite:") {
            return Ok(Destination::Sqlite(descriptor.to_string()));
        }
        Err(AppError::config(format!(
            "Unsupported destination '{descriptor}' (expected file://<dir> or sqlite://<path>)"
        )))
    }
}

/// Open the backend selected by a destination descriptor.
pub async fn open(descriptor: &str, group_id: i64) -> Result<Arc<dyn TopicStorage>> {
    match Destination::parse(descriptor)? {
        Destination::File(dir) => {
            log::info!("Using file storage at {}", dir.display());
            Ok(Arc::new(FileStorage::create(dir, group_id).await?))
        }
        Destination::Sqlite(url) => {
            log::info!("Using relational storage at {}", url);
            Ok(Arc::new(SqlStorage::connect(&url).await?))
        }
    }
}
