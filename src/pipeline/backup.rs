// src/pipeline/backup.rs

//! Combined discovery + worker pool pipeline.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, DispatchReport};
use crate::pipeline::dispatch::Dispatcher;
use crate::remote::BoardApi;
use crate::services::{Discovery, TopicFetcher, TopicLister};
use crate::storage::TopicStorage;

/// Sessions needed by [`run_backup`]: one for discovery, at least one worker.
pub const MIN_BACKUP_SESSIONS: usize = 2;

/// Run a backup of `config.group_id`.
///
/// The first session drives discovery; the remaining ones become workers.
/// Returns once discovery has ended and every discovered topic was handled.
/// A discovery failure that exhausted its retries is returned after the
/// workers drained what was already queued.
pub async fn run_backup(
    config: &Config,
    sessions: Vec<Arc<dyn BoardApi>>,
    storage: Arc<dyn TopicStorage>,
    cancel: CancellationToken,
) -> Result<DispatchReport> {
    if sessions.len() < MIN_BACKUP_SESSIONS {
        return Err(AppError::config(format!(
            "backup needs at least {} sessions (1 discovery + 1 worker), got {}",
            MIN_BACKUP_SESSIONS,
            sessions.len()
        )));
    }

    let mut sessions = sessions.into_iter();
    let Some(discovery_session) = sessions.next() else {
        return Err(AppError::config("no discovery session"));
    };
    let workers: Vec<Arc<dyn BoardApi>> = sessions.collect();

    log::info!(
        "Backing up group {}: {:?} discovery, {} workers",
        config.group_id,
        config.discovery.mode,
        workers.len()
    );

    let discovery_cancel = cancel.child_token();
    let Discovery {
        topics,
        errors,
        handle,
    } = TopicLister::from_config(config).spawn(discovery_session, discovery_cancel.clone());
    let error_log = tokio::spawn(log_discovery_errors(errors));

    let dispatcher = Dispatcher::new(
        config.group_id,
        TopicFetcher::new(config.fetch.comment_page_size),
        storage,
    );
    let mut report = match dispatcher.run(workers, topics).await {
        Ok(report) => report,
        Err(e) => {
            discovery_cancel.cancel();
            return Err(e);
        }
    };

    report.discovery_errors = error_log.await?;
    let discovered = handle.await?;
    log_report(&report);

    let discovered = discovered?;
    log::info!("Discovery emitted {} topics", discovered);
    Ok(report)
}

/// Drain the discovery error channel into the log.
pub(crate) async fn log_discovery_errors(mut errors: mpsc::UnboundedReceiver<AppError>) -> usize {
    let mut count = 0;
    while let Some(e) = errors.recv().await {
        log::warn!("Discovery page failed: {}", e);
        count += 1;
    }
    count
}

/// Log a run summary.
pub fn log_report(report: &DispatchReport) {
    log::info!(
        "Processed {} topics in {:.1}s: {} created, {} updated, {} skipped, {} failed",
        report.processed(),
        report.elapsed_secs(),
        report.created,
        report.updated,
        report.skipped,
        report.failed
    );
    if report.discovery_errors > 0 {
        log::warn!("{} listing pages had to be retried", report.discovery_errors);
    }
    for (worker, count) in report.per_worker.iter().enumerate() {
        log::debug!("  worker {}: {} items", worker, count);
    }
}
