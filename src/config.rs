//! Configuration Module
//!
//! Loads the engine configuration from environment variables. The resulting
//! `Config` is built once at startup and shared read-only (behind an `Arc`)
//! with every component that needs it.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CounterKind, CounterSpec, EvictionPolicy, ListKind};

/// Reads `name` from the environment, falling back to `default` when the
/// variable is missing or does not parse.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// == List Config ==
/// Sizing and expiry of one family of recency lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    /// Maximum members kept per owner
    pub capacity: usize,
    /// Sliding TTL in seconds, refreshed on every read and write
    pub ttl_secs: u64,
    /// What to drop when the list is full
    pub eviction: EvictionPolicy,
    /// Items returned per page
    pub page_size: usize,
}

impl ListConfig {
    /// Per-owner list: single eviction, one page spans the whole list.
    pub fn per_owner(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            capacity,
            ttl_secs,
            eviction: EvictionPolicy::Single,
            page_size: capacity,
        }
    }

    /// Shared high-traffic list: batch eviction of `capacity / fraction` members.
    pub fn shared(capacity: usize, ttl_secs: u64, fraction: usize, page_size: usize) -> Self {
        Self {
            capacity,
            ttl_secs,
            eviction: EvictionPolicy::Batch { fraction },
            page_size,
        }
    }

    /// Overrides the defaults with `{PREFIX}_CAPACITY`, `{PREFIX}_TTL` and
    /// `{PREFIX}_PAGE_SIZE`.
    fn from_env(prefix: &str, default: ListConfig) -> Self {
        let capacity = env_or(&format!("{prefix}_CAPACITY"), default.capacity);
        let ttl_secs = env_or(&format!("{prefix}_TTL"), default.ttl_secs);
        let page_size = match default.eviction {
            EvictionPolicy::Single => capacity,
            EvictionPolicy::Batch { .. } => env_or(&format!("{prefix}_PAGE_SIZE"), default.page_size),
        };
        Self {
            capacity,
            ttl_secs,
            eviction: default.eviction,
            page_size,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// == Cache Config ==
/// Cache backend, list and counter settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Concurrent backend handles
    pub pool_size: usize,
    /// How long a caller waits for a backend handle
    pub acquire_timeout_ms: u64,
    pub follow: ListConfig,
    pub follower: ListConfig,
    pub publish: ListConfig,
    pub favorite: ListConfig,
    pub comment: ListConfig,
    pub feed: ListConfig,
    /// TTL in seconds of every counter below its promotion threshold
    pub count_ttl: u64,
    /// Follow/follower count at which a user's counters stop expiring
    pub follow_count_threshold: i64,
    /// Favorite/comment count at which a video's counters stop expiring
    pub video_count_threshold: i64,
    /// TTL in seconds of pending-delete markers
    pub pending_delete_ttl: u64,
    /// TTL in seconds of cached video snapshots
    pub video_ttl: u64,
}

impl CacheConfig {
    /// Returns the settings of one list family.
    pub fn list(&self, kind: ListKind) -> &ListConfig {
        match kind {
            ListKind::Follow => &self.follow,
            ListKind::Follower => &self.follower,
            ListKind::Publish => &self.publish,
            ListKind::Favorite => &self.favorite,
            ListKind::Comment => &self.comment,
            ListKind::Feed => &self.feed,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn count_ttl(&self) -> Duration {
        Duration::from_secs(self.count_ttl)
    }

    pub fn pending_delete_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_delete_ttl)
    }

    pub fn video_ttl(&self) -> Duration {
        Duration::from_secs(self.video_ttl)
    }

    /// Expiry and promotion threshold of one counter family.
    pub fn counter(&self, kind: CounterKind) -> CounterSpec {
        let threshold = match kind {
            CounterKind::Following | CounterKind::Followers => self.follow_count_threshold,
            CounterKind::Favorites | CounterKind::Comments => self.video_count_threshold,
        };
        CounterSpec::new(self.count_ttl(), threshold)
    }

    fn from_env() -> Self {
        let d = Self::default();
        Self {
            pool_size: env_or("CACHE_POOL_SIZE", d.pool_size),
            acquire_timeout_ms: env_or("CACHE_ACQUIRE_TIMEOUT_MS", d.acquire_timeout_ms),
            follow: ListConfig::from_env("FOLLOW_LIST", d.follow),
            follower: ListConfig::from_env("FOLLOWER_LIST", d.follower),
            publish: ListConfig::from_env("PUBLISH_LIST", d.publish),
            favorite: ListConfig::from_env("FAVORITE_LIST", d.favorite),
            comment: ListConfig::from_env("COMMENT_LIST", d.comment),
            feed: ListConfig::from_env("FEED", d.feed),
            count_ttl: env_or("COUNT_TTL", d.count_ttl),
            follow_count_threshold: env_or("FOLLOW_COUNT_THRESHOLD", d.follow_count_threshold),
            video_count_threshold: env_or("VIDEO_COUNT_THRESHOLD", d.video_count_threshold),
            pending_delete_ttl: env_or("PENDING_DELETE_TTL", d.pending_delete_ttl),
            video_ttl: env_or("VIDEO_TTL", d.video_ttl),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            acquire_timeout_ms: 2000,
            follow: ListConfig::per_owner(30, 600),
            follower: ListConfig::per_owner(30, 600),
            publish: ListConfig::per_owner(30, 600),
            favorite: ListConfig::per_owner(30, 600),
            comment: ListConfig::per_owner(30, 600),
            feed: ListConfig::shared(3000, 3600, 10, 30),
            count_ttl: 600,
            follow_count_threshold: 1000,
            video_count_threshold: 10_000,
            pending_delete_ttl: 60,
            video_ttl: 600,
        }
    }
}

// == Queue Config ==
/// Durable queue and reconciliation settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of ordering partitions, one reconciler each
    pub partitions: usize,
    /// Attempts per record before it is dead-lettered
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            max_attempts: 3,
            backoff_ms: 200,
        }
    }
}

// == Store Config ==
/// Source-of-truth store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Postgres URL; the in-process store is used when absent
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout_ms: 2000,
        }
    }
}

/// Engine configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Worker identity handed to the id generator
    pub worker_id: u16,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `WORKER_ID` - Id generator worker identity (default: 1)
    /// - `CACHE_POOL_SIZE`, `CACHE_ACQUIRE_TIMEOUT_MS` - Cache handle pool
    /// - `{FOLLOW_LIST,FOLLOWER_LIST,PUBLISH_LIST,FAVORITE_LIST,COMMENT_LIST,FEED}_{CAPACITY,TTL}`
    /// - `FEED_PAGE_SIZE` - Feed page size (default: 30)
    /// - `COUNT_TTL`, `FOLLOW_COUNT_THRESHOLD`, `VIDEO_COUNT_THRESHOLD`, `PENDING_DELETE_TTL`,
    ///   `VIDEO_TTL`
    /// - `QUEUE_PARTITIONS`, `RECONCILE_MAX_ATTEMPTS`, `RECONCILE_BACKOFF_MS`
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_ACQUIRE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let queue = QueueConfig::default();
        let store = StoreConfig::default();
        Self {
            server_port: env_or("SERVER_PORT", 3000),
            cleanup_interval: env_or("CLEANUP_INTERVAL", 1),
            worker_id: env_or("WORKER_ID", 1),
            cache: CacheConfig::from_env(),
            queue: QueueConfig {
                partitions: env_or("QUEUE_PARTITIONS", queue.partitions).max(1),
                max_attempts: env_or("RECONCILE_MAX_ATTEMPTS", queue.max_attempts).max(1),
                backoff_ms: env_or("RECONCILE_BACKOFF_MS", queue.backoff_ms),
            },
            store: StoreConfig {
                database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", store.max_connections),
                acquire_timeout_ms: env_or(
                    "DATABASE_ACQUIRE_TIMEOUT_MS",
                    store.acquire_timeout_ms,
                ),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 1,
            worker_id: 1,
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
