//! Response DTOs
//!
//! Defines the structure of outgoing HTTP response bodies. Errors are
//! rendered by `AppError` itself.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::Video;
use crate::queue::DeadLetter;

/// A video decorated for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoView {
    #[serde(flatten)]
    pub video: Video,
    pub favorite_count: i64,
    pub comment_count: i64,
    /// Whether the viewer favorited it; false for anonymous viewers
    pub is_favorite: bool,
}

/// One member of a follow or follower list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowEntry {
    pub user_id: u64,
    /// When the relation was created, in milliseconds
    pub followed_at: i64,
}

/// Response body for GET /user/:user_id/counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserCounts {
    pub user_id: u64,
    pub following: i64,
    pub followers: i64,
}

/// Response body for the action endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub message: String,
    /// Id of the created video or comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }

    pub fn created(message: impl Into<String>, id: u64) -> Self {
        Self {
            message: message.into(),
            id: Some(id),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bundles: u64,
    pub rolled_back: u64,
    pub total_entries: usize,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Mutations queued but not yet reconciled
    pub queue_lag: usize,
    pub dead_letters: usize,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, queue_lag: usize, dead_letters: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            bundles: stats.bundles,
            rolled_back: stats.rolled_back,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
            queue_lag,
            dead_letters,
        }
    }
}

/// Response body for GET /admin/dead-letters
#[derive(Debug, Clone, Serialize)]
pub struct DeadLettersResponse {
    pub count: usize,
    pub records: Vec<DeadLetter>,
}

impl From<Vec<DeadLetter>> for DeadLettersResponse {
    fn from(records: Vec<DeadLetter>) -> Self {
        Self {
            count: records.len(),
            records,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
