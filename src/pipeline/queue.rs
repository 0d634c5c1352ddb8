// src/pipeline/queue.rs

//! Decoupled discovery and work over a line-oriented id stream.
//!
//! `run_enqueue` writes one topic id per line; `run_work` reads the same
//! format and feeds a worker pool. Any transport that moves lines between
//! the two (a pipe, a file, a queue bridge) can sit in between.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, DispatchReport};
use crate::pipeline::backup::{log_discovery_errors, log_report};
use crate::pipeline::dispatch::Dispatcher;
use crate::remote::BoardApi;
use crate::services::{Discovery, TopicFetcher, TopicLister};
use crate::storage::TopicStorage;

/// Run discovery only, writing each discovered topic id to `out`.
///
/// Returns the number of ids written.
pub async fn run_enqueue<W>(
    config: &Config,
    session: Arc<dyn BoardApi>,
    out: &mut W,
    cancel: CancellationToken,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let Discovery {
        mut topics,
        errors,
        handle,
    } = TopicLister::from_config(config).spawn(session, cancel);
    let error_log = tokio::spawn(log_discovery_errors(errors));

    let mut written = 0;
    while let Some(summary) = topics.recv().await {
        out.write_all(format!("{}\n", summary.id).as_bytes())
            .await?;
        // Line-at-a-time so a downstream consumer sees ids promptly
        out.flush().await?;
        written += 1;
    }
    drop(topics);

    let failed_pages = error_log.await?;
    if failed_pages > 0 {
        log::warn!("{} listing pages had to be retried", failed_pages);
    }
    handle.await??;

    log::info!("Enqueued {} topic ids", written);
    Ok(written)
}

/// Parse one queued line into a topic id; blank lines yield `None`.
pub fn parse_topic_id(line: &str) -> Result<Option<i64>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line.parse::<i64>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(AppError::validation(format!("invalid topic id: {line:?}"))),
    }
}

/// Consume topic ids from `input` with every session acting as a worker.
pub async fn run_work<R>(
    config: &Config,
    sessions: Vec<Arc<dyn BoardApi>>,
    storage: Arc<dyn TopicStorage>,
    input: R,
    cancel: CancellationToken,
) -> Result<DispatchReport>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    if sessions.is_empty() {
        return Err(AppError::config("work needs at least 1 session"));
    }
    log::info!(
        "Consuming topic ids for group {} with {} workers",
        config.group_id,
        sessions.len()
    );

    let (tx, rx) = mpsc::channel::<i64>(1);
    let reader = tokio::spawn(read_ids(input, tx, cancel));

    let dispatcher = Dispatcher::new(
        config.group_id,
        TopicFetcher::new(config.fetch.comment_page_size),
        storage,
    );
    let report = dispatcher.run(sessions, rx).await?;
    let read = reader.await??;

    log::debug!("Read {} topic ids", read);
    log_report(&report);
    Ok(report)
}

/// Forward ids from `input` until end of input, cancellation or a closed queue.
async fn read_ids<R>(input: R, tx: mpsc::Sender<i64>, cancel: CancellationToken) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut read = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match parse_topic_id(&line) {
            Ok(Some(id)) => {
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(id) => sent,
                };
                if sent.is_err() {
                    break;
                }
                read += 1;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Skipping queue line: {}", e),
        }
    }

    Ok(read)
}
