// src/models/report.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

/// Summary of one dispatch run
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Listing pages that failed and were retried
    pub discovery_errors: usize,
    /// Items handled per worker, indexed by worker number
    pub per_worker: Vec<usize>,
}

impl DispatchReport {
    pub fn new(workers: usize) -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            discovery_errors: 0,
            per_worker: vec![0; workers],
        }
    }

    /// Count one item handled by `worker`.
    pub fn record(&mut self, worker: usize, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
        if let Some(count) = self.per_worker.get_mut(worker) {
            *count += 1;
        }
    }

    /// Fold a worker's partial report into this one.
    pub fn merge(&mut self, other: &DispatchReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.discovery_errors += other.discovery_errors;
        if self.per_worker.len() < other.per_worker.len() {
            self.per_worker.resize(other.per_worker.len(), 0);
        }
        for (total, count) in self.per_worker.iter_mut().zip(&other.per_worker) {
            *total += count;
        }
    }

    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    pub fn finish(&mut self) {
        self.end_time = Utc::now();
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
