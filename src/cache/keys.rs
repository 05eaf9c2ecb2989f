//! Key naming for every cached structure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The six recency-list families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    /// Users an owner follows
    Follow,
    /// Users following an owner
    Follower,
    /// Videos an owner published
    Publish,
    /// Videos an owner favorited
    Favorite,
    /// Comments on a video
    Comment,
    /// Global feed, single owner
    Feed,
}

impl ListKind {
    pub const ALL: [ListKind; 6] = [
        ListKind::Follow,
        ListKind::Follower,
        ListKind::Publish,
        ListKind::Favorite,
        ListKind::Comment,
        ListKind::Feed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Follow => "follow",
            ListKind::Follower => "follower",
            ListKind::Publish => "publish",
            ListKind::Favorite => "favorite",
            ListKind::Comment => "comment",
            ListKind::Feed => "feed",
        }
    }

    /// Cache key of the list owned by `owner`. The feed ignores the owner.
    pub fn key(&self, owner: u64) -> String {
        match self {
            ListKind::Feed => "list:feed".to_string(),
            kind => format!("list:{}:{}", kind.as_str(), owner),
        }
    }

    /// Cache key of the pending-delete markers for this list's owner.
    pub fn pending_key(&self, owner: u64) -> String {
        format!("pending:{}:{}", self.as_str(), owner)
    }

    /// Lists whose store fallback must hide members still being deleted.
    pub fn masks_pending_deletes(&self) -> bool {
        matches!(self, ListKind::Favorite | ListKind::Follow | ListKind::Comment)
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Users a user follows
    Following,
    /// Users following a user
    Followers,
    /// Favorites on a video
    Favorites,
    /// Comments on a video
    Comments,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Following => "following",
            CounterKind::Followers => "followers",
            CounterKind::Favorites => "favorites",
            CounterKind::Comments => "comments",
        }
    }

    pub fn key(&self, owner: u64) -> String {
        format!("count:{}:{}", self.as_str(), owner)
    }
}

/// Cache key of a serialized video snapshot.
pub fn video_key(video_id: u64) -> String {
    format!("video:{video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_keys() {
        assert_eq!(ListKind::Favorite.key(42), "list:favorite:42");
        assert_eq!(ListKind::Feed.key(42), "list:feed");
        assert_eq!(ListKind::Feed.key(0), ListKind::Feed.key(7));
        assert_eq!(ListKind::Follow.pending_key(9), "pending:follow:9");
    }

    #[test]
    fn test_counter_keys_are_distinct() {
        assert_ne!(CounterKind::Following.key(1), CounterKind::Followers.key(1));
        assert_eq!(CounterKind::Comments.key(5), "count:comments:5");
    }

    #[test]
    fn test_pending_masks() {
        let masked: Vec<ListKind> = ListKind::ALL
            .into_iter()
            .filter(ListKind::masks_pending_deletes)
            .collect();
        assert_eq!(
            masked,
            vec![ListKind::Follow, ListKind::Favorite, ListKind::Comment]
        );
    }
}
