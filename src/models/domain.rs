//! Domain records
//!
//! Rows of the source-of-truth store. Every record carries its creation time
//! in milliseconds, which doubles as its score in recency lists.

use serde::{Deserialize, Serialize};

/// A published video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: u64,
    pub author_id: u64,
    pub title: String,
    pub play_url: String,
    pub cover_url: String,
    pub created_at: i64,
}

/// A user liking a video. Unique per (user, video).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: u64,
    pub video_id: u64,
    pub created_at: i64,
}

impl Favorite {
    pub fn key(&self) -> FavoriteKey {
        FavoriteKey {
            user_id: self.user_id,
            video_id: self.video_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FavoriteKey {
    pub user_id: u64,
    pub video_id: u64,
}

/// `follower_id` follows `followee_id`. Unique per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: u64,
    pub followee_id: u64,
    pub created_at: i64,
}

impl Follow {
    pub fn key(&self) -> FollowKey {
        FollowKey {
            follower_id: self.follower_id,
            followee_id: self.followee_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowKey {
    pub follower_id: u64,
    pub followee_id: u64,
}

/// A comment on a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub video_id: u64,
    pub user_id: u64,
    pub content: String,
    pub created_at: i64,
}

impl Comment {
    pub fn key(&self) -> CommentKey {
        CommentKey {
            video_id: self.video_id,
            id: self.id,
        }
    }
}

/// A comment id together with the video it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentKey {
    pub video_id: u64,
    pub id: u64,
}

/// Current time in milliseconds, the score unit of every list.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
