//! Service layer for the backup application.
//!
//! - Topic discovery (`TopicLister`)
//! - Full topic download (`TopicFetcher`)

mod discovery;
mod topics;

pub use discovery::{Discovery, ListingPolicy, TopicLister};
pub use topics::{TopicFetcher, VIDEO_LINK_BASE, resolve_attachment};
