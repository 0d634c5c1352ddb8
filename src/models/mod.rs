// src/models/mod.rs

//! Domain models for the backup application.
//!
//! - `topic`: canonical records persisted by storage backends
//! - `remote`: raw payloads of the remote board API
//! - `config`: application configuration
//! - `report`: dispatch run summaries

mod config;
pub mod remote;
mod report;
mod topic;

// Re-export all public types
pub use config::{
    Account, Config, DiscoveryConfig, DiscoveryMode, FetchConfig, RemoteConfig, StorageConfig,
};
pub use remote::{DetailParams, ListParams, TopicDetailPage, TopicList, TopicOrder};
pub use report::{DispatchReport, ItemOutcome};
pub use topic::{Comment, Poll, PollAnswer, Profile, Topic, TopicSummary};
