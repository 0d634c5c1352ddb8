//! Remote board capability.
//!
//! The pipeline depends only on [`BoardApi`]; one implementation instance is
//! one authenticated session. [`HttpSession`] talks to a VK-style method API.

mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Config, DetailParams, ListParams, TopicDetailPage, TopicList};

pub use http::HttpSession;

/// Listing and detail calls against the remote board.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Fetch one page of the topic listing.
    async fn list_topics(
        &self,
        group_id: i64,
        page_size: usize,
        params: ListParams,
    ) -> Result<TopicList>;

    /// Fetch one page of topic detail.
    ///
    /// Topic metadata is included when `params.offset == 0`.
    async fn fetch_topic_detail(
        &self,
        group_id: i64,
        topic_id: i64,
        params: DetailParams,
    ) -> Result<TopicDetailPage>;
}

/// Open one HTTP session per configured account, in configuration order.
pub fn open_sessions(config: &Config) -> Result<Vec<Arc<dyn BoardApi>>> {
    config
        .accounts
        .iter()
        .map(|account| {
            let session = HttpSession::new(&config.remote, account)?;
            log::debug!("Opened session {}", session.name());
            Ok(Arc::new(session) as Arc<dyn BoardApi>)
        })
        .collect()
}
