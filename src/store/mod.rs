//! Source-of-truth store
//!
//! The relational store every cached structure is derived from. The cache
//! layer only talks to it through `SourceStore`, so the in-process store and
//! Postgres are interchangeable.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CounterKind, ListKind};
use crate::models::{Comment, CommentKey, Favorite, FavoriteKey, Follow, FollowKey, Video};

// == Errors ==
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Conflict { constraint: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(err: impl fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Records ==
/// Kinds of rows the write-behind pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Favorite,
    Follow,
    Comment,
    Video,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Favorite => "favorite",
            EntityKind::Follow => "follow",
            EntityKind::Comment => "comment",
            EntityKind::Video => "video",
        }
    }
}

/// A full row, as inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Favorite(Favorite),
    Follow(Follow),
    Comment(Comment),
    Video(Video),
}

impl Record {
    pub fn entity(&self) -> EntityKind {
        match self {
            Record::Favorite(_) => EntityKind::Favorite,
            Record::Follow(_) => EntityKind::Follow,
            Record::Comment(_) => EntityKind::Comment,
            Record::Video(_) => EntityKind::Video,
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Record::Favorite(f) => RecordKey::Favorite(f.key()),
            Record::Follow(f) => RecordKey::Follow(f.key()),
            Record::Comment(c) => RecordKey::Comment(c.key()),
            Record::Video(v) => RecordKey::Video(v.id),
        }
    }
}

/// The uniqueness key of a row, which is all a delete needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Favorite(FavoriteKey),
    Follow(FollowKey),
    Comment(CommentKey),
    Video(u64),
}

impl RecordKey {
    pub fn entity(&self) -> EntityKind {
        match self {
            RecordKey::Favorite(_) => EntityKind::Favorite,
            RecordKey::Follow(_) => EntityKind::Follow,
            RecordKey::Comment(_) => EntityKind::Comment,
            RecordKey::Video(_) => EntityKind::Video,
        }
    }
}

/// `favorite:{user}:{video}`, `follow:{follower}:{followee}`, `comment:{id}`,
/// `video:{id}`.
impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Favorite(k) => write!(f, "favorite:{}:{}", k.user_id, k.video_id),
            RecordKey::Follow(k) => write!(f, "follow:{}:{}", k.follower_id, k.followee_id),
            RecordKey::Comment(k) => write!(f, "comment:{}", k.id),
            RecordKey::Video(id) => write!(f, "video:{id}"),
        }
    }
}

// == List Rows ==
/// What a list row carries besides its member id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowBody {
    Bare,
    Video(Video),
    Comment(Comment),
}

/// One row of a list range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub member: u64,
    pub score: i64,
    pub body: RowBody,
}

impl ListRow {
    pub fn bare(member: u64, score: i64) -> Self {
        Self {
            member,
            score,
            body: RowBody::Bare,
        }
    }

    pub fn video(video: Video) -> Self {
        Self {
            member: video.id,
            score: video.created_at,
            body: RowBody::Video(video),
        }
    }

    pub fn comment(comment: Comment) -> Self {
        Self {
            member: comment.id,
            score: comment.created_at,
            body: RowBody::Comment(comment),
        }
    }
}

// == Source Store ==
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Inserts a row; a uniqueness violation is `Conflict`.
    async fn insert(&self, record: &Record) -> StoreResult<()>;

    /// Deletes a row; an absent row is `NotFound`.
    async fn delete(&self, key: &RecordKey) -> StoreResult<()>;

    async fn exists(&self, key: &RecordKey) -> StoreResult<bool>;

    /// Up to `limit` rows of `owner`'s list with `score <= max_score`,
    /// newest first.
    async fn range(
        &self,
        list: ListKind,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<ListRow>>;

    async fn count(&self, counter: CounterKind, owner: u64) -> StoreResult<i64>;

    async fn video(&self, id: u64) -> StoreResult<Option<Video>>;

    async fn comment(&self, id: u64) -> StoreResult<Option<Comment>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys_share_affinity_format() {
        let favorite = Record::Favorite(Favorite {
            user_id: 1,
            video_id: 2,
            created_at: 10,
        });
        let key = favorite.key();
        assert_eq!(key.to_string(), "favorite:1:2");
        assert_eq!(key.entity(), EntityKind::Favorite);

        assert_eq!(
            RecordKey::Comment(CommentKey { video_id: 4, id: 9 }).to_string(),
            "comment:9"
        );
        assert_eq!(
            RecordKey::Follow(FollowKey {
                follower_id: 3,
                followee_id: 4
            })
            .to_string(),
            "follow:3:4"
        );
    }

    #[test]
    fn test_video_row_scores_by_creation() {
        let row = ListRow::video(Video {
            id: 5,
            author_id: 1,
            title: "t".into(),
            play_url: "p".into(),
            cover_url: "c".into(),
            created_at: 77,
        });
        assert_eq!((row.member, row.score), (5, 77));
    }
}
