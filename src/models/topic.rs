//! Canonical topic data structures.
//!
//! A [`Topic`] is the unit persisted by every storage backend. Timestamps are
//! unix seconds as reported by the remote board.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Minimal listing entry used for the staleness decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub id: i64,
    /// Remote last-modified marker
    pub updated_at: i64,
}

/// A participant profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub screen_name: String,
    /// Avatar URL
    pub photo: String,
}

impl Profile {
    /// Placeholder profile carrying only an id.
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// A comment inside a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    /// Author profile id
    pub from_id: i64,
    pub date: i64,
    pub text: String,
    pub likes: i64,
    #[serde(default)]
    pub reply_to_uid: i64,
    #[serde(default)]
    pub reply_to_cid: i64,
    /// One resolved URL per attachment, in remote order
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A poll attached to a topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub votes: i64,
    pub answers: Vec<PollAnswer>,
    pub multiple: bool,
    pub end_date: i64,
    pub closed: bool,
}

/// A single poll option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollAnswer {
    pub id: i64,
    pub text: String,
    pub votes: i64,
    pub rate: f64,
}

/// A fully fetched discussion topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub is_closed: bool,
    pub is_fixed: bool,
    pub created_at: i64,
    pub created_by: Profile,
    pub updated_at: i64,
    pub updated_by: Profile,
    /// Every participant seen while fetching, keyed by profile id
    #[serde(default)]
    pub profiles: BTreeMap<i64, Profile>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Topic {
    /// Record holding only the storage key and staleness marker.
    pub fn marker(id: i64, updated_at: i64) -> Self {
        Self {
            id,
            updated_at,
            ..Self::default()
        }
    }

    /// Summary used by the change detector.
    pub fn summary(&self) -> TopicSummary {
        TopicSummary {
            id: self.id,
            updated_at: self.updated_at,
        }
    }

    /// Profiles to persist: the participant map plus creator and last editor.
    pub fn all_profiles(&self) -> BTreeMap<i64, Profile> {
        let mut profiles = self.profiles.clone();
        profiles
            .entry(self.created_by.id)
            .or_insert_with(|| self.created_by.clone());
        profiles
            .entry(self.updated_by.id)
            .or_insert_with(|| self.updated_by.clone());
        profiles
    }
}
