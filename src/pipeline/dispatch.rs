// src/pipeline/dispatch.rs

//! Worker pool draining a topic work queue.
//!
//! Every worker owns one remote session for its whole lifetime and pulls
//! items from a shared receiver, so each queued item is handled by exactly
//! one worker. Per-item failures are logged and counted; they never stop the
//! sibling workers.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::error::{AppError, Result};
use crate::models::{DispatchReport, ItemOutcome, TopicSummary};
use crate::pipeline::diff::{Decision, SkipReason, decide};
use crate::remote::BoardApi;
use crate::services::TopicFetcher;
use crate::storage::TopicStorage;

/// Unit of work handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// Discovered by the lister, carries the remote marker
    Listed(TopicSummary),
    /// Bare id read from an external queue
    Bare(i64),
}

impl WorkItem {
    pub fn topic_id(&self) -> i64 {
        match self {
            WorkItem::Listed(summary) => summary.id,
            WorkItem::Bare(id) => *id,
        }
    }
}

impl From<TopicSummary> for WorkItem {
    fn from(summary: TopicSummary) -> Self {
        WorkItem::Listed(summary)
    }
}

impl From<i64> for WorkItem {
    fn from(id: i64) -> Self {
        WorkItem::Bare(id)
    }
}

type SharedQueue<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Fans work items out to a fixed set of worker sessions.
#[derive(Clone)]
pub struct Dispatcher {
    group_id: i64,
    fetcher: TopicFetcher,
    storage: Arc<dyn TopicStorage>,
}

impl Dispatcher {
    pub fn new(group_id: i64, fetcher: TopicFetcher, storage: Arc<dyn TopicStorage>) -> Self {
        Self {
            group_id,
            fetcher,
            storage,
        }
    }

    /// Run one worker per session until `queue` is closed and drained.
    pub async fn run<T>(
        &self,
        workers: Vec<Arc<dyn BoardApi>>,
        queue: mpsc::Receiver<T>,
    ) -> Result<DispatchReport>
    where
        T: Into<WorkItem> + Send + 'static,
    {
        if workers.is_empty() {
            return Err(AppError::config("at least one worker session is required"));
        }

        let worker_count = workers.len();
        let mut report = DispatchReport::new(worker_count);
        let queue: SharedQueue<T> = Arc::new(Mutex::new(queue));
        log::info!("Starting {} workers for group {}", worker_count, self.group_id);

        let mut join_set = JoinSet::new();
        for (index, session) in workers.into_iter().enumerate() {
            let dispatcher = self.clone();
            let queue = Arc::clone(&queue);
            join_set.spawn(async move {
                dispatcher
                    .work_loop(index, worker_count, session, queue)
                    .await
            });
        }

        // A crashed worker must not abort its siblings mid-fetch
        let mut crashed = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(partial) => report.merge(&partial),
                Err(e) => {
                    log::error!("Worker task failed: {}", e);
                    crashed.get_or_insert(e);
                }
            }
        }

        report.finish();
        match crashed {
            Some(e) => Err(AppError::Task(e)),
            None => Ok(report),
        }
    }

    async fn work_loop<T>(
        &self,
        index: usize,
        worker_count: usize,
        session: Arc<dyn BoardApi>,
        queue: SharedQueue<T>,
    ) -> DispatchReport
    where
        T: Into<WorkItem>,
    {
        let mut report = DispatchReport::new(worker_count);

        loop {
            // Lock is released before the item is processed
            let next = queue.lock().await.recv().await;
            let Some(item) = next else {
                break;
            };
            let item: WorkItem = item.into();

            let outcome = match self.process(session.as_ref(), item).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!(
                        "Worker {}: topic {} failed: {}",
                        index,
                        item.topic_id(),
                        e
                    );
                    ItemOutcome::Failed
                }
            };
            report.record(index, outcome);
        }

        log::debug!(
            "Worker {} finished after {} items",
            index,
            report.processed()
        );
        report
    }

    /// Handle one work item: staleness check, fetch, save.
    pub async fn process(&self, api: &dyn BoardApi, item: WorkItem) -> Result<ItemOutcome> {
        match item {
            WorkItem::Listed(summary) => {
                let stored = self.storage.find(summary.id).await?;
                let decision = decide(&summary, stored.as_ref());
                if let Decision::Skip(reason) = decision {
                    log_skip(summary.id, reason);
                    return Ok(ItemOutcome::Skipped);
                }

                let topic = self.fetcher.fetch(api, self.group_id, summary.id).await?;
                self.storage.save(&topic).await?;
                Ok(log_write(summary.id, decision))
            }
            WorkItem::Bare(topic_id) => {
                // No remote marker yet: fetch first, then compare
                let topic = self.fetcher.fetch(api, self.group_id, topic_id).await?;
                let stored = self.storage.find(topic_id).await?;
                let decision = decide(&topic.summary(), stored.as_ref());
                if let Decision::Skip(reason) = decision {
                    log_skip(topic_id, reason);
                    return Ok(ItemOutcome::Skipped);
                }

                self.storage.save(&topic).await?;
                Ok(log_write(topic_id, decision))
            }
        }
    }
}

fn log_skip(topic_id: i64, reason: SkipReason) {
    match reason {
        SkipReason::Unchanged => log::debug!("Topic {} unchanged", topic_id),
        SkipReason::StoredNewer { stored, remote } => log::warn!(
            "Topic {} skipped: stored version {} is newer than remote {}",
            topic_id,
            stored,
            remote
        ),
    }
}

fn log_write(topic_id: i64, decision: Decision) -> ItemOutcome {
    if decision == Decision::Create {
        log::info!("Topic {} created", topic_id);
        ItemOutcome::Created
    } else {
        log::info!("Topic {} updated", topic_id);
        ItemOutcome::Updated
    }
}
