// src/services/discovery.rs

//! Topic discovery service.
//!
//! Enumerates topic summaries from the remote listing and pushes them into a
//! channel. Two policies are supported:
//!
//! - **Exhaustive**: page through the whole listing by offset until the
//!   cumulative item count reaches the remote-reported total.
//! - **Tailing**: poll the first page of recently updated topics, once or
//!   forever. Already processed ids are re-emitted; the change detector
//!   downstream absorbs them.
//!
//! A failed page is reported on the error channel and retried at the same
//! offset until the circuit breaker trips.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, DiscoveryMode, ListParams, TopicOrder, TopicSummary};
use crate::pipeline::CircuitBreaker;
use crate::remote::BoardApi;

/// Discovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPolicy {
    Exhaustive,
    Tailing { continuous: bool },
}

/// Channels handed out by [`TopicLister::spawn`].
pub struct Discovery {
    pub topics: mpsc::Receiver<TopicSummary>,
    pub errors: mpsc::UnboundedReceiver<AppError>,
    /// Number of emitted summaries, or the escalated failure
    pub handle: JoinHandle<Result<usize>>,
}

/// Service producing topic summaries for one group.
#[derive(Debug, Clone)]
pub struct TopicLister {
    group_id: i64,
    page_size: usize,
    policy: ListingPolicy,
    poll_interval: Duration,
    max_page_failures: usize,
}

impl TopicLister {
    /// Create a lister with default pacing.
    pub fn new(group_id: i64, page_size: usize, policy: ListingPolicy) -> Self {
        Self {
            group_id,
            page_size: page_size.max(1),
            policy,
            poll_interval: Duration::from_millis(500),
            max_page_failures: 5,
        }
    }

    /// Create a lister from the `[discovery]` configuration section.
    pub fn from_config(config: &Config) -> Self {
        let discovery = &config.discovery;
        let policy = match discovery.mode {
            DiscoveryMode::All => ListingPolicy::Exhaustive,
            DiscoveryMode::Recent => ListingPolicy::Tailing {
                continuous: discovery.continuous,
            },
        };
        Self::new(config.group_id, discovery.page_size, policy)
            .with_poll_interval(discovery.poll_interval())
            .with_max_page_failures(discovery.max_page_failures)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_page_failures(mut self, max_page_failures: usize) -> Self {
        self.max_page_failures = max_page_failures.max(1);
        self
    }

    pub fn policy(&self) -> ListingPolicy {
        self.policy
    }

    /// Run discovery on a background task.
    ///
    /// The topic channel holds a single pending summary, so a slow consumer
    /// backpressures the listing.
    pub fn spawn(self, api: Arc<dyn BoardApi>, cancel: CancellationToken) -> Discovery {
        let (topic_tx, topics) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::unbounded_channel();
        let handle =
            tokio::spawn(async move { self.run(api.as_ref(), topic_tx, error_tx, cancel).await });
        Discovery {
            topics,
            errors,
            handle,
        }
    }

    /// Run discovery until the listing ends, the consumer goes away or
    /// `cancel` fires. Both channels close when this returns.
    pub async fn run(
        &self,
        api: &dyn BoardApi,
        sink: mpsc::Sender<TopicSummary>,
        errors: mpsc::UnboundedSender<AppError>,
        cancel: CancellationToken,
    ) -> Result<usize> {
        let emitted = match self.policy {
            ListingPolicy::Exhaustive => self.run_exhaustive(api, &sink, &errors, &cancel).await?,
            ListingPolicy::Tailing { continuous } => {
                self.run_tailing(api, continuous, &sink, &errors, &cancel)
                    .await?
            }
        };
        log::info!("Discovery finished after emitting {} topics", emitted);
        Ok(emitted)
    }

    async fn run_exhaustive(
        &self,
        api: &dyn BoardApi,
        sink: &mpsc::Sender<TopicSummary>,
        errors: &mpsc::UnboundedSender<AppError>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut breaker = CircuitBreaker::with_limit(self.max_page_failures);
        let mut offset = 0;
        let mut seen = 0;
        let mut emitted = 0;

        loop {
            let params = ListParams {
                order: TopicOrder::CreatedAscending,
                offset,
            };
            let page = tokio::select! {
                _ = cancel.cancelled() => return Ok(emitted),
                page = api.list_topics(self.group_id, self.page_size, params) => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(error) => {
                    let _ = errors.send(error);
                    breaker.check_failure(&format!("topic listing at offset {offset}"))?;
                    if !self.pause(cancel).await {
                        return Ok(emitted);
                    }
                    continue;
                }
            };
            breaker.record_success();

            let received = page.items.len();
            log::debug!(
                "Listing page at offset {}: {} topics (reported total {})",
                offset,
                received,
                page.count
            );
            for topic in page.items {
                let summary = TopicSummary {
                    id: topic.id,
                    updated_at: topic.updated,
                };
                if !emit(sink, summary, cancel).await {
                    return Ok(emitted);
                }
                emitted += 1;
            }

            seen += received;
            if seen >= page.count {
                break;
            }
            if received == 0 {
                log::warn!(
                    "Listing ended at offset {} with {} of {} reported topics",
                    offset,
                    seen,
                    page.count
                );
                break;
            }
            offset += self.page_size;
        }

        Ok(emitted)
    }

    async fn run_tailing(
        &self,
        api: &dyn BoardApi,
        continuous: bool,
        sink: &mpsc::Sender<TopicSummary>,
        errors: &mpsc::UnboundedSender<AppError>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut breaker = CircuitBreaker::with_limit(self.max_page_failures);
        let mut emitted = 0;
        let params = ListParams {
            order: TopicOrder::RecentlyUpdated,
            offset: 0,
        };

        loop {
            let page = tokio::select! {
                _ = cancel.cancelled() => return Ok(emitted),
                page = api.list_topics(self.group_id, self.page_size, params) => page,
            };

            match page {
                Ok(page) => {
                    breaker.record_success();
                    for topic in page.items {
                        let summary = TopicSummary {
                            id: topic.id,
                            updated_at: topic.updated,
                        };
                        if !emit(sink, summary, cancel).await {
                            return Ok(emitted);
                        }
                        emitted += 1;
                    }
                    if !continuous {
                        return Ok(emitted);
                    }
                }
                Err(error) => {
                    let _ = errors.send(error);
                    breaker.check_failure("recent topics listing")?;
                }
            }

            if !self.pause(cancel).await {
                return Ok(emitted);
            }
        }
    }

    /// Sleep for the poll interval; false when cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }
}

/// Send a summary; false when cancelled or the consumer is gone.
async fn emit(
    sink: &mpsc::Sender<TopicSummary>,
    summary: TopicSummary,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = sink.send(summary) => sent.is_ok(),
    }
}
