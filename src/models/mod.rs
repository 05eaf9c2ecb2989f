//! Domain records and HTTP bodies
//!
//! `domain` holds the rows shared by the cache, the queue and the store;
//! `requests` and `responses` are the JSON bodies of the API.

pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{now_millis, Comment, CommentKey, Favorite, FavoriteKey, Follow, FollowKey, Video};
pub use requests::{
    ActionType, CommentActionRequest, FavoriteActionRequest, ListQuery, PublishRequest,
    RelationActionRequest,
};
pub use responses::{
    ActionResponse, DeadLettersResponse, FollowEntry, HealthResponse, StatsResponse, UserCounts,
    VideoView,
};
