//! Pipeline entry points for backup operations.
//!
//! - `run_backup`: discover topics and mirror them with a worker pool
//! - `run_enqueue`: discover topics and write their ids to a line stream
//! - `run_work`: mirror topics whose ids arrive on a line stream

pub mod backup;
pub mod circuit_breaker;
pub mod diff;
pub mod dispatch;
pub mod queue;

pub use backup::{MIN_BACKUP_SESSIONS, log_report, run_backup};
pub use circuit_breaker::CircuitBreaker;
pub use diff::{Decision, SkipReason, decide};
pub use dispatch::{Dispatcher, WorkItem};
pub use queue::{parse_topic_id, run_enqueue, run_work};
