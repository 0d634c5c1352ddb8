//! Change detection for incremental backups.
//!
//! Decides whether a topic has to be (re)downloaded by comparing the
//! remote `updated_at` marker with the stored record.
//!
//! > A stored topic is never overwritten by an older remote state.

use crate::models::{Topic, TopicSummary};

/// Why a topic was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stored marker equals the remote marker
    Unchanged,
    /// Stored marker is newer than the remote one (stale page or late queue delivery)
    StoredNewer { stored: i64, remote: i64 },
}

/// Outcome of the staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Create,
    Update,
}

impl Decision {
    /// Whether the topic must be fetched and saved.
    pub fn needs_write(&self) -> bool {
        !matches!(self, Decision::Skip(_))
    }
}

/// Decide what to do with a topic given its remote summary and stored record.
///
/// A stored record with id 0 counts as absent.
pub fn decide(remote: &TopicSummary, stored: Option<&Topic>) -> Decision {
    match stored.filter(|topic| topic.id != 0) {
        None => Decision::Create,
        Some(topic) if topic.updated_at == remote.updated_at => {
            Decision::Skip(SkipReason::Unchanged)
        }
        Some(topic) if topic.updated_at > remote.updated_at => {
            Decision::Skip(SkipReason::StoredNewer {
                stored: topic.updated_at,
                remote: remote.updated_at,
            })
        }
        Some(_) => Decision::Update,
    }
}
