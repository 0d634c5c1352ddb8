//! In-memory remote and storage doubles shared by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::remote::{RawComment, RawPoll, RawProfile, RawTopic};
use crate::models::{DetailParams, ListParams, Topic, TopicDetailPage, TopicList, TopicOrder};
use crate::remote::BoardApi;
use crate::storage::TopicStorage;

pub fn raw_topic(id: i64, updated: i64) -> RawTopic {
    RawTopic {
        id,
        title: format!("Topic {id}"),
        created: 1,
        created_by: 1,
        updated,
        updated_by: 1,
        ..RawTopic::default()
    }
}

pub fn raw_comment(id: i64, from_id: i64) -> RawComment {
    RawComment {
        id,
        from_id,
        date: 1_600_000_000 + id,
        text: format!("comment {id}"),
        ..RawComment::default()
    }
}

pub fn raw_profile(id: i64, first_name: &str) -> RawProfile {
    RawProfile {
        id,
        first_name: first_name.to_string(),
        ..RawProfile::default()
    }
}

/// Scripted remote board.
#[derive(Default)]
pub struct FakeBoard {
    topics: Vec<RawTopic>,
    comments: HashMap<i64, Vec<RawComment>>,
    comment_totals: HashMap<i64, usize>,
    profiles: Vec<RawProfile>,
    polls: HashMap<i64, RawPoll>,
    page_profiles: HashMap<(i64, usize), Vec<RawProfile>>,
    page_polls: HashMap<(i64, usize), RawPoll>,
    reported_total: Option<usize>,
    list_failures: AtomicUsize,
    failing_detail_offset: Option<usize>,
    list_calls: Mutex<Vec<ListParams>>,
    detail_calls: Mutex<Vec<(i64, usize)>>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: RawTopic, comments: Vec<RawComment>) -> Self {
        self.comments.insert(topic.id, comments);
        self.topics.push(topic);
        self
    }

    /// Listing of `count` topics with ids `1..=count`.
    pub fn with_listing(mut self, count: i64) -> Self {
        for id in 1..=count {
            self = self.with_topic(raw_topic(id, 1_000 + id), Vec::new());
        }
        self
    }

    pub fn with_profiles(mut self, profiles: Vec<RawProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_poll(mut self, topic_id: i64, poll: RawPoll) -> Self {
        self.polls.insert(topic_id, poll);
        self
    }

    /// Extra profiles returned only on the detail page at `offset`.
    pub fn with_page_profiles(
        mut self,
        topic_id: i64,
        offset: usize,
        profiles: Vec<RawProfile>,
    ) -> Self {
        self.page_profiles.insert((topic_id, offset), profiles);
        self
    }

    /// Poll returned only on the detail page at `offset`.
    pub fn with_page_poll(mut self, topic_id: i64, offset: usize, poll: RawPoll) -> Self {
        self.page_polls.insert((topic_id, offset), poll);
        self
    }

    /// Override the comment total reported for a topic.
    pub fn with_comment_total(mut self, topic_id: i64, total: usize) -> Self {
        self.comment_totals.insert(topic_id, total);
        self
    }

    /// Override the listing total reported on every page.
    pub fn with_reported_total(mut self, total: usize) -> Self {
        self.reported_total = Some(total);
        self
    }

    /// Fail the next `count` listing calls.
    pub fn failing_lists(self, count: usize) -> Self {
        self.list_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every detail call at the given comment offset.
    pub fn failing_detail_at(mut self, offset: usize) -> Self {
        self.failing_detail_offset = Some(offset);
        self
    }

    pub fn list_calls(&self) -> Vec<ListParams> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn detail_offsets(&self, topic_id: i64) -> Vec<usize> {
        self.detail_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == topic_id)
            .map(|(_, offset)| *offset)
            .collect()
    }
}

#[async_trait]
impl BoardApi for FakeBoard {
    async fn list_topics(
        &self,
        _group_id: i64,
        page_size: usize,
        params: ListParams,
    ) -> Result<TopicList> {
        self.list_calls.lock().unwrap().push(params);

        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::remote("board.getTopics", "scripted failure"));
        }

        let mut topics = self.topics.clone();
        if params.order == TopicOrder::RecentlyUpdated {
            topics.sort_by(|a, b| b.updated.cmp(&a.updated));
        }
        let items = topics
            .into_iter()
            .skip(params.offset)
            .take(page_size)
            .collect();

        Ok(TopicList {
            count: self.reported_total.unwrap_or(self.topics.len()),
            items,
        })
    }

    async fn fetch_topic_detail(
        &self,
        _group_id: i64,
        topic_id: i64,
        params: DetailParams,
    ) -> Result<TopicDetailPage> {
        self.detail_calls
            .lock()
            .unwrap()
            .push((topic_id, params.offset));

        if self.failing_detail_offset == Some(params.offset) {
            return Err(AppError::remote(
                format!("topic {topic_id}"),
                "scripted failure",
            ));
        }

        let meta = self
            .topics
            .iter()
            .find(|t| t.id == topic_id)
            .cloned()
            .ok_or_else(|| AppError::remote(format!("topic {topic_id}"), "not found"))?;
        let all_comments = self.comments.get(&topic_id).cloned().unwrap_or_default();
        let count = self
            .comment_totals
            .get(&topic_id)
            .copied()
            .unwrap_or(all_comments.len());
        let items: Vec<RawComment> = all_comments
            .into_iter()
            .skip(params.offset)
            .take(params.count)
            .collect();

        let mut wanted: Vec<i64> = items.iter().map(|c| c.from_id).collect();
        if params.offset == 0 {
            wanted.push(meta.created_by);
            wanted.push(meta.updated_by);
        }
        let mut profiles: Vec<RawProfile> = self
            .profiles
            .iter()
            .filter(|p| wanted.contains(&p.id))
            .cloned()
            .collect();
        if let Some(extra) = self.page_profiles.get(&(topic_id, params.offset)) {
            profiles.extend(extra.iter().cloned());
        }
        let poll = self
            .page_polls
            .get(&(topic_id, params.offset))
            .or_else(|| self.polls.get(&topic_id))
            .cloned();

        Ok(TopicDetailPage {
            topic: (params.offset == 0).then_some(meta),
            count,
            items,
            profiles,
            poll,
        })
    }
}

/// Storage double recording every save.
#[derive(Default)]
pub struct MemoryStorage {
    topics: Mutex<BTreeMap<i64, Topic>>,
    saves: Mutex<Vec<i64>>,
    fail_ids: Vec<i64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject saves for the given topic ids.
    pub fn failing_for(mut self, ids: &[i64]) -> Self {
        self.fail_ids = ids.to_vec();
        self
    }

    pub fn insert(&self, topic: Topic) {
        self.topics.lock().unwrap().insert(topic.id, topic);
    }

    pub fn saves(&self) -> Vec<i64> {
        self.saves.lock().unwrap().clone()
    }

    pub fn get(&self, id: i64) -> Option<Topic> {
        self.topics.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl TopicStorage for MemoryStorage {
    async fn find(&self, topic_id: i64) -> Result<Option<Topic>> {
        Ok(self.get(topic_id))
    }

    async fn save(&self, topic: &Topic) -> Result<()> {
        self.saves.lock().unwrap().push(topic.id);
        if self.fail_ids.contains(&topic.id) {
            return Err(AppError::storage(format!("scripted failure for {}", topic.id)));
        }
        self.insert(topic.clone());
        Ok(())
    }
}
