// src/services/topics.rs

//! Topic fetcher service.
//!
//! Pulls every comment page of a topic from one session and maps the raw
//! payloads into a canonical [`Topic`]. Any failed page aborts the whole
//! fetch, so a partially fetched topic never reaches storage.

use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::models::remote::{
    RawAttachment, RawComment, RawImage, RawPoll, RawPollAnswer, RawProfile, RawTopic,
};
use crate::models::{Comment, DetailParams, Poll, PollAnswer, Profile, Topic};
use crate::remote::BoardApi;

/// Prefix of the deep link built for video attachments.
pub const VIDEO_LINK_BASE: &str = "https://vk.com/video";

/// Service for fetching complete topics.
#[derive(Debug, Clone)]
pub struct TopicFetcher {
    comment_page_size: usize,
}

impl TopicFetcher {
    /// Create a fetcher requesting `comment_page_size` comments per page.
    pub fn new(comment_page_size: usize) -> Self {
        Self {
            comment_page_size: comment_page_size.max(1),
        }
    }

    /// Fetch a topic with all of its comments, poll and participant profiles.
    pub async fn fetch(&self, api: &dyn BoardApi, group_id: i64, topic_id: i64) -> Result<Topic> {
        let mut meta: Option<RawTopic> = None;
        let mut profiles: BTreeMap<i64, Profile> = BTreeMap::new();
        let mut poll: Option<Poll> = None;
        let mut comments: Vec<Comment> = Vec::new();

        loop {
            let params = DetailParams {
                offset: comments.len(),
                count: self.comment_page_size,
                extended: true,
            };
            let page = api.fetch_topic_detail(group_id, topic_id, params).await?;

            if let Some(topic) = page.topic {
                meta = Some(topic);
            }

            // Last seen wins for repeated profile ids
            for profile in page.profiles {
                profiles.insert(profile.id, Profile::from(profile));
            }

            if let Some(raw_poll) = page.poll {
                poll = Some(Poll::from(raw_poll));
            }

            let received = page.items.len();
            comments.extend(page.items.into_iter().map(Comment::from));

            if comments.len() >= page.count {
                break;
            }
            if received == 0 {
                log::warn!(
                    "Topic {}: remote reported {} comments but returned an empty page at {}",
                    topic_id,
                    page.count,
                    comments.len()
                );
                break;
            }
        }

        let meta = meta.ok_or_else(|| {
            AppError::decode(format!("topic {topic_id}: detail response had no metadata"))
        })?;

        let created_by = profile_or_placeholder(&profiles, meta.created_by);
        let updated_by = profile_or_placeholder(&profiles, meta.updated_by);
        profiles
            .entry(created_by.id)
            .or_insert_with(|| created_by.clone());
        profiles
            .entry(updated_by.id)
            .or_insert_with(|| updated_by.clone());

        log::debug!(
            "Fetched topic {} with {} comments and {} profiles",
            meta.id,
            comments.len(),
            profiles.len()
        );

        Ok(Topic {
            id: meta.id,
            title: meta.title,
            is_closed: meta.is_closed,
            is_fixed: meta.is_fixed,
            created_at: meta.created,
            created_by,
            updated_at: meta.updated,
            updated_by,
            profiles,
            poll,
            comments,
        })
    }
}

fn profile_or_placeholder(profiles: &BTreeMap<i64, Profile>, id: i64) -> Profile {
    profiles
        .get(&id)
        .cloned()
        .unwrap_or_else(|| Profile::with_id(id))
}

/// Resolve an attachment to a single representative URL.
///
/// Only photo, sticker, video and audio are kept. Any other kind resolves to
/// `None` and is dropped from the comment without an error.
pub fn resolve_attachment(attachment: &RawAttachment) -> Option<String> {
    match attachment.kind.as_str() {
        "photo" => attachment
            .photo
            .as_ref()
            .and_then(|photo| largest_variant(&photo.sizes)),
        "sticker" => attachment
            .sticker
            .as_ref()
            .and_then(|sticker| largest_variant(&sticker.images)),
        "video" => attachment
            .video
            .as_ref()
            .map(|video| format!("{}{}_{}", VIDEO_LINK_BASE, video.owner_id, video.id)),
        "audio" => attachment.audio.as_ref().map(|audio| audio.url.clone()),
        _ => None,
    }
}

/// URL of the variant with the largest area; the first one wins ties.
fn largest_variant(variants: &[RawImage]) -> Option<String> {
    let mut best: Option<&RawImage> = None;
    for variant in variants {
        match best {
            Some(current) if variant.area() <= current.area() => {}
            _ => best = Some(variant),
        }
    }
    best.map(|image| image.url.clone())
}

impl From<RawProfile> for Profile {
    fn from(raw: RawProfile) -> Self {
        Self {
            id: raw.id,
            first_name: raw.first_name,
            last_name: raw.last_name,
            screen_name: raw.screen_name,
            photo: raw.photo,
        }
    }
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        let attachments = raw.attachments.iter().filter_map(resolve_attachment).collect();
        Self {
            id: raw.id,
            from_id: raw.from_id,
            date: raw.date,
            text: raw.text,
            likes: raw.likes.count,
            reply_to_uid: raw.reply_to_uid,
            reply_to_cid: raw.reply_to_cid,
            attachments,
        }
    }
}

impl From<RawPoll> for Poll {
    fn from(raw: RawPoll) -> Self {
        Self {
            id: raw.id,
            question: raw.question,
            votes: raw.votes,
            answers: raw.answers.into_iter().map(PollAnswer::from).collect(),
            multiple: raw.multiple,
            end_date: raw.end_date,
            closed: raw.closed,
        }
    }
}

impl From<RawPollAnswer> for PollAnswer {
    fn from(raw: RawPollAnswer) -> Self {
        Self {
            id: raw.id,
            text: raw.text,
            votes: raw.votes,
            rate: raw.rate,
        }
    }
}
