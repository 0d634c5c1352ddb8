// src/storage/sql.rs

//! Relational storage on SQLite.
//!
//! A save runs two transactions. The first upserts every referenced profile,
//! the second upserts the topic row, drops the child rows of the previous
//! version and writes its comments, attachments, poll and poll answers. A
//! failure rolls back only the transaction it happened in; re-running the
//! save converges because every write is an upsert keyed by primary key.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::Result;
use crate::models::Topic;
use crate::storage::TopicStorage;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    is_closed INTEGER NOT NULL,
    is_fixed INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by INTEGER NOT NULL,
    updated_by INTEGER NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    screen_name TEXT NOT NULL,
    photo TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profile_names (
    profile_id INTEGER NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    screen_name TEXT NOT NULL,
    photo TEXT NOT NULL,
    date INTEGER NOT NULL,
    PRIMARY KEY (profile_id, first_name, last_name, screen_name, photo)
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    from_id INTEGER NOT NULL,
    date INTEGER NOT NULL,
    text TEXT NOT NULL,
    likes INTEGER NOT NULL,
    reply_to_uid INTEGER NOT NULL,
    reply_to_cid INTEGER NOT NULL,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    profile_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
    content TEXT NOT NULL,
    comment_id INTEGER NOT NULL REFERENCES comments(id),
    PRIMARY KEY (comment_id, content)
);

CREATE TABLE IF NOT EXISTS polls (
    id INTEGER PRIMARY KEY,
    question TEXT NOT NULL,
    votes INTEGER NOT NULL,
    multiple INTEGER NOT NULL,
    end_date INTEGER NOT NULL,
    closed INTEGER NOT NULL,
    topic_id INTEGER NOT NULL REFERENCES topics(id)
);

CREATE TABLE IF NOT EXISTS poll_answers (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    votes INTEGER NOT NULL,
    rate REAL NOT NULL,
    poll_id INTEGER NOT NULL REFERENCES polls(id)
);

CREATE INDEX IF NOT EXISTS idx_comments_topic_id ON comments(topic_id);
CREATE INDEX IF NOT EXISTS idx_polls_topic_id ON polls(topic_id);
CREATE INDEX IF NOT EXISTS idx_poll_answers_poll_id ON poll_answers(poll_id);

CREATE TRIGGER IF NOT EXISTS profiles_history_insert
AFTER INSERT ON profiles
BEGIN
    INSERT OR IGNORE INTO profile_names
        (profile_id, first_name, last_name, screen_name, photo, date)
    VALUES
        (NEW.id, NEW.first_name, NEW.last_name, NEW.screen_name, NEW.photo,
         CAST(strftime('%s', 'now') AS INTEGER));
END;

CREATE TRIGGER IF NOT EXISTS profiles_history_update
AFTER UPDATE ON profiles
BEGIN
    INSERT OR IGNORE INTO profile_names
        (profile_id, first_name, last_name, screen_name, photo, date)
    VALUES
        (NEW.id, NEW.first_name, NEW.last_name, NEW.screen_name, NEW.photo,
         CAST(strftime('%s', 'now') AS INTEGER));
END;
"#;

const UPSERT_PROFILE: &str = "INSERT INTO profiles \
     (id, first_name, last_name, screen_name, photo) \
     VALUES (?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET first_name = excluded.first_name, \
     last_name = excluded.last_name, screen_name = excluded.screen_name, photo = excluded.photo";

const UPSERT_TOPIC: &str = "INSERT INTO topics \
     (id, title, is_closed, is_fixed, created_at, updated_at, created_by, updated_by, deleted) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0) \
     ON CONFLICT (id) DO UPDATE SET title = excluded.title, is_closed = excluded.is_closed, \
     is_fixed = excluded.is_fixed, created_at = excluded.created_at, \
     updated_at = excluded.updated_at, created_by = excluded.created_by, \
     updated_by = excluded.updated_by";

const UPSERT_COMMENT: &str = "INSERT INTO comments \
     (id, from_id, date, text, likes, reply_to_uid, reply_to_cid, topic_id, profile_id) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET date = excluded.date, text = excluded.text, \
     likes = excluded.likes, reply_to_uid = excluded.reply_to_uid, \
     reply_to_cid = excluded.reply_to_cid";

const UPSERT_ATTACHMENT: &str = "INSERT INTO attachments (content, comment_id) VALUES (?, ?) \
     ON CONFLICT (comment_id, content) DO NOTHING";

const UPSERT_POLL: &str = "INSERT INTO polls \
     (id, question, votes, multiple, end_date, closed, topic_id) \
     VALUES (?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET question = excluded.question, votes = excluded.votes, \
     multiple = excluded.multiple, end_date = excluded.end_date, closed = excluded.closed";

const UPSERT_POLL_ANSWER: &str = "INSERT INTO poll_answers (id, text, votes, rate, poll_id) \
     VALUES (?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET text = excluded.text, votes = excluded.votes, \
     rate = excluded.rate";

const DELETE_ATTACHMENTS: &str = "DELETE FROM attachments \
     WHERE comment_id IN (SELECT id FROM comments WHERE topic_id = ?)";

const DELETE_COMMENTS: &str = "DELETE FROM comments WHERE topic_id = ?";

const DELETE_POLL_ANSWERS: &str = "DELETE FROM poll_answers \
     WHERE poll_id IN (SELECT id FROM polls WHERE topic_id = ?)";

const DELETE_POLLS: &str = "DELETE FROM polls WHERE topic_id = ?";

/// SQLite-backed storage with normalized tables.
#[derive(Clone)]
pub struct SqlStorage {
    pool: SqlitePool,
}

impl SqlStorage {
    /// Connect to a `sqlite:` URL and migrate the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        // Every pooled connection would get its own private in-memory database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Create tables and triggers if they don't exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// First transaction: every profile the topic references.
    async fn save_profiles(&self, topic: &Topic) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for profile in topic.all_profiles().values() {
            sqlx::query(UPSERT_PROFILE)
                .bind(profile.id)
                .bind(&profile.first_name)
                .bind(&profile.last_name)
                .bind(&profile.screen_name)
                .bind(&profile.photo)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Second transaction: topic, comments, attachments, poll, poll answers.
    async fn save_topic_graph(&self, topic: &Topic) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_TOPIC)
            .bind(topic.id)
            .bind(&topic.title)
            .bind(topic.is_closed)
            .bind(topic.is_fixed)
            .bind(topic.created_at)
            .bind(topic.updated_at)
            .bind(topic.created_by.id)
            .bind(topic.updated_by.id)
            .execute(&mut *tx)
            .await?;

        // Children are replaced, not merged; order follows the foreign keys
        let stale_children = [
            DELETE_ATTACHMENTS,
            DELETE_COMMENTS,
            DELETE_POLL_ANSWERS,
            DELETE_POLLS,
        ];
        for statement in stale_children {
            sqlx::query(statement).bind(topic.id).execute(&mut *tx).await?;
        }

        for comment in &topic.comments {
            sqlx::query(UPSERT_COMMENT)
                .bind(comment.id)
                .bind(comment.from_id)
                .bind(comment.date)
                .bind(&comment.text)
                .bind(comment.likes)
                .bind(comment.reply_to_uid)
                .bind(comment.reply_to_cid)
                .bind(topic.id)
                .bind(comment.from_id)
                .execute(&mut *tx)
                .await?;

            for attachment in &comment.attachments {
                sqlx::query(UPSERT_ATTACHMENT)
                    .bind(attachment)
                    .bind(comment.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let Some(poll) = &topic.poll {
            sqlx::query(UPSERT_POLL)
                .bind(poll.id)
                .bind(&poll.question)
                .bind(poll.votes)
                .bind(poll.multiple)
                .bind(poll.end_date)
                .bind(poll.closed)
                .bind(topic.id)
                .execute(&mut *tx)
                .await?;

            for answer in &poll.answers {
                sqlx::query(UPSERT_POLL_ANSWER)
                    .bind(answer.id)
                    .bind(&answer.text)
                    .bind(answer.votes)
                    .bind(answer.rate)
                    .bind(poll.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TopicStorage for SqlStorage {
    /// Only the id and `updated_at` are loaded.
    async fn find(&self, topic_id: i64) -> Result<Option<Topic>> {
        let row = sqlx::query("SELECT id, updated_at FROM topics WHERE id = ?")
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Topic::marker(row.get("id"), row.get("updated_at"))))
    }

    async fn save(&self, topic: &Topic) -> Result<()> {
        self.save_profiles(topic).await?;
        self.save_topic_graph(topic).await?;
        log::debug!(
            "Saved topic {} ({} comments) to relational storage",
            topic.id,
            topic.comments.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, Poll, PollAnswer, Profile};
    use futures::future;

    async fn memory_storage() -> SqlStorage {
        SqlStorage::connect("sqlite::memory:").await.unwrap()
    }

    async fn count(storage: &SqlStorage, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get("n")
    }

    fn profile(id: i64, first_name: &str) -> Profile {
        Profile {
            id,
            first_name: first_name.into(),
            last_name: "Doe".into(),
            screen_name: format!("id{id}"),
            photo: format!("https://example.com/{id}.jpg"),
        }
    }

    fn sample_topic() -> Topic {
        let mut topic = Topic::marker(10, 1_000);
        topic.title = "Weekly thread".into();
        topic.created_at = 500;
        topic.created_by = profile(1, "Creator");
        topic.updated_by = profile(2, "Editor");
        topic.profiles.insert(3, profile(3, "Commenter"));
        topic.comments = vec![
            Comment {
                id: 100,
                from_id: 3,
                date: 600,
                text: "hello".into(),
                likes: 2,
                attachments: vec![
                    "https://example.com/a.jpg".into(),
                    "https://vk.com/video-1_2".into(),
                ],
                ..Comment::default()
            },
            Comment {
                id: 101,
                from_id: 1,
                date: 700,
                text: "reply".into(),
                reply_to_uid: 3,
                reply_to_cid: 100,
                ..Comment::default()
            },
        ];
        topic.poll = Some(Poll {
            id: 55,
            question: "Best day?".into(),
            votes: 4,
            answers: vec![
                PollAnswer {
                    id: 1,
                    text: "Monday".into(),
                    votes: 1,
                    rate: 25.0,
                },
                PollAnswer {
                    id: 2,
                    text: "Friday".into(),
                    votes: 3,
                    rate: 75.0,
                },
            ],
            ..Poll::default()
        });
        topic
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let storage = memory_storage().await;
        assert!(storage.find(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_writes_all_tables() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        assert_eq!(count(&storage, "topics").await, 1);
        assert_eq!(count(&storage, "profiles").await, 3);
        assert_eq!(count(&storage, "profile_names").await, 3);
        assert_eq!(count(&storage, "comments").await, 2);
        assert_eq!(count(&storage, "attachments").await, 2);
        assert_eq!(count(&storage, "polls").await, 1);
        assert_eq!(count(&storage, "poll_answers").await, 2);

        let rate: f64 = sqlx::query("SELECT rate FROM poll_answers WHERE id = 2")
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get("rate");
        assert_eq!(rate, 75.0);
    }

    #[tokio::test]
    async fn test_update_replaces_child_rows() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        let mut edited = sample_topic();
        edited.updated_at = 2_000;
        edited.comments.retain(|c| c.id == 101);
        edited.poll = None;
        storage.save(&edited).await.unwrap();

        assert_eq!(count(&storage, "comments").await, 1);
        assert_eq!(count(&storage, "attachments").await, 0);
        assert_eq!(count(&storage, "polls").await, 0);
        assert_eq!(count(&storage, "poll_answers").await, 0);
        // Profiles are shared across topics and never dropped
        assert_eq!(count(&storage, "profiles").await, 3);
        assert_eq!(
            storage.find(10).await.unwrap(),
            Some(Topic::marker(10, 2_000))
        );
    }

    #[tokio::test]
    async fn test_update_keeps_rows_of_other_topics() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        let mut other = Topic::marker(11, 1_000);
        other.comments.push(Comment {
            id: 200,
            from_id: 1,
            attachments: vec!["https://example.com/b.jpg".into()],
            ..Comment::default()
        });
        storage.save(&other).await.unwrap();

        let mut edited = sample_topic();
        edited.comments.clear();
        storage.save(&edited).await.unwrap();

        assert_eq!(count(&storage, "comments").await, 1);
        assert_eq!(count(&storage, "attachments").await, 1);
        assert_eq!(count(&storage, "polls").await, 1);
    }

    #[tokio::test]
    async fn test_find_returns_marker_only() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        let found = storage.find(10).await.unwrap().unwrap();
        assert_eq!(found, Topic::marker(10, 1_000));
    }

    #[tokio::test]
    async fn test_save_twice_is_idempotent() {
        let storage = memory_storage().await;
        let topic = sample_topic();
        storage.save(&topic).await.unwrap();
        storage.save(&topic).await.unwrap();

        assert_eq!(count(&storage, "topics").await, 1);
        assert_eq!(count(&storage, "profiles").await, 3);
        assert_eq!(count(&storage, "profile_names").await, 3);
        assert_eq!(count(&storage, "comments").await, 2);
        assert_eq!(count(&storage, "attachments").await, 2);
        assert_eq!(count(&storage, "polls").await, 1);
        assert_eq!(count(&storage, "poll_answers").await, 2);
    }

    #[tokio::test]
    async fn test_update_replaces_mutable_columns() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        let mut edited = sample_topic();
        edited.updated_at = 2_000;
        edited.title = "Renamed".into();
        edited.comments[0].text = "edited".into();
        storage.save(&edited).await.unwrap();

        let row = sqlx::query("SELECT title, updated_at FROM topics WHERE id = 10")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("title"), "Renamed");
        assert_eq!(row.get::<i64, _>("updated_at"), 2_000);

        let text: String = sqlx::query("SELECT text FROM comments WHERE id = 100")
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get("text");
        assert_eq!(text, "edited");
    }

    #[tokio::test]
    async fn test_profile_rename_is_recorded_in_history() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();

        let mut renamed = sample_topic();
        renamed.profiles.insert(3, profile(3, "Renamed"));
        storage.save(&renamed).await.unwrap();

        assert_eq!(count(&storage, "profiles").await, 3);
        let history: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM profile_names WHERE profile_id = 3")
                .fetch_one(storage.pool())
                .await
                .unwrap()
                .get("n");
        assert_eq!(history, 2);
    }

    #[tokio::test]
    async fn test_topic_without_poll_writes_no_poll_rows() {
        let storage = memory_storage().await;
        let mut topic = sample_topic();
        topic.poll = None;
        storage.save(&topic).await.unwrap();

        assert_eq!(count(&storage, "polls").await, 0);
        assert_eq!(count(&storage, "poll_answers").await, 0);
    }

    #[tokio::test]
    async fn test_poll_answer_failure_rolls_back_topic_graph_only() {
        let storage = memory_storage().await;
        sqlx::raw_sql(
            "CREATE TRIGGER reject_answers BEFORE INSERT ON poll_answers \
             BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let result = storage.save(&sample_topic()).await;
        assert!(result.is_err());

        // Profiles committed in the first transaction
        assert_eq!(count(&storage, "profiles").await, 3);
        // Topic graph rolled back together
        assert_eq!(count(&storage, "topics").await, 0);
        assert_eq!(count(&storage, "comments").await, 0);
        assert_eq!(count(&storage, "attachments").await, 0);
        assert_eq!(count(&storage, "polls").await, 0);
        assert!(storage.find(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_poll_answer_failure_keeps_previous_topic_version() {
        let storage = memory_storage().await;
        storage.save(&sample_topic()).await.unwrap();
        sqlx::raw_sql(
            "CREATE TRIGGER reject_answers BEFORE UPDATE ON poll_answers \
             BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let mut edited = sample_topic();
        edited.updated_at = 2_000;
        edited.created_by = profile(1, "NewName");
        assert!(storage.save(&edited).await.is_err());

        // Topic stays at the stored marker, profile update survived
        assert_eq!(
            storage.find(10).await.unwrap(),
            Some(Topic::marker(10, 1_000))
        );
        let first_name: String = sqlx::query("SELECT first_name FROM profiles WHERE id = 1")
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get("first_name");
        assert_eq!(first_name, "NewName");
    }

    #[tokio::test]
    async fn test_concurrent_saves_of_different_topics() {
        let storage = memory_storage().await;
        let saves = (1..=5).map(|id| {
            let storage = storage.clone();
            tokio::spawn(async move {
                let mut topic = sample_topic();
                topic.id = id;
                topic.comments.clear();
                topic.poll = None;
                storage.save(&topic).await
            })
        });
        for result in future::join_all(saves).await {
            result.unwrap().unwrap();
        }

        assert_eq!(count(&storage, "topics").await, 5);
    }
}
