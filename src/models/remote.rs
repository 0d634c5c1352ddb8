//! Raw payloads returned by the remote board API.
//!
//! These mirror the wire shape closely; [`crate::services::TopicFetcher`]
//! maps them into the canonical [`crate::models::Topic`].

use serde::{Deserialize, Deserializer};

/// Listing order requested from `list_topics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicOrder {
    /// Most recently updated first
    RecentlyUpdated,
    /// Oldest created first, stable for offset pagination
    CreatedAscending,
}

impl TopicOrder {
    /// Wire value of the `order` parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            TopicOrder::RecentlyUpdated => "1",
            TopicOrder::CreatedAscending => "-2",
        }
    }
}

/// Parameters for one listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub order: TopicOrder,
    pub offset: usize,
}

/// Parameters for one detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailParams {
    /// Number of comments already collected
    pub offset: usize,
    /// Comments per page
    pub count: usize,
    /// Inline participant profiles in the response
    pub extended: bool,
}

/// One page of the topic listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicList {
    /// Remote-reported size of the whole listing, may be approximate
    pub count: usize,
    #[serde(default)]
    pub items: Vec<RawTopic>,
}

/// Topic metadata as listed by the remote.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopic {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_closed: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_fixed: bool,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub created_by: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(default)]
    pub updated_by: i64,
}

/// One page of topic detail: a slice of comments, plus topic metadata on the
/// first page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicDetailPage {
    #[serde(default)]
    pub topic: Option<RawTopic>,
    /// Remote-reported comment total for the topic
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub items: Vec<RawComment>,
    #[serde(default)]
    pub profiles: Vec<RawProfile>,
    #[serde(default)]
    pub poll: Option<RawPoll>,
}

/// Comment page as returned by the comments method, without topic metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommentPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub items: Vec<RawComment>,
    #[serde(default)]
    pub profiles: Vec<RawProfile>,
    #[serde(default)]
    pub poll: Option<RawPoll>,
}

impl RawCommentPage {
    /// Attach topic metadata to form a detail page.
    pub fn with_topic(self, topic: Option<RawTopic>) -> TopicDetailPage {
        TopicDetailPage {
            topic,
            count: self.count,
            items: self.items,
            profiles: self.profiles,
            poll: self.poll,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default, alias = "photo_100")]
    pub photo: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComment {
    pub id: i64,
    #[serde(default)]
    pub from_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub likes: RawLikes,
    #[serde(default)]
    pub reply_to_uid: i64,
    #[serde(default)]
    pub reply_to_cid: i64,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLikes {
    #[serde(default)]
    pub count: i64,
}

/// An attachment; the payload lives under the key named by `type`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub photo: Option<RawPhoto>,
    #[serde(default)]
    pub sticker: Option<RawSticker>,
    #[serde(default)]
    pub video: Option<RawVideo>,
    #[serde(default)]
    pub audio: Option<RawAudio>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPhoto {
    #[serde(default)]
    pub sizes: Vec<RawImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSticker {
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// A size variant of a photo or sticker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    pub url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

impl RawImage {
    pub fn area(&self) -> i64 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideo {
    pub id: i64,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAudio {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPoll {
    pub id: i64,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub answers: Vec<RawPollAnswer>,
    #[serde(default, deserialize_with = "flag")]
    pub multiple: bool,
    #[serde(default)]
    pub end_date: i64,
    #[serde(default, deserialize_with = "flag")]
    pub closed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPollAnswer {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub rate: f64,
}

/// The remote encodes booleans as either `true`/`false` or `1`/`0`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}
