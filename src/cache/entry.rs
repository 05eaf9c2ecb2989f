//! Cache Entry Module
//!
//! Defines the structure for individual keyspace entries with TTL support.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::SortedSet;

// == Cache Value ==
/// Typed payload stored under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Signed counter
    Int(i64),
    /// Opaque text (serialized snapshots)
    Text(String),
    /// Bounded, score-ordered members
    Sorted(SortedSet),
    /// Unordered id set
    Set(BTreeSet<u64>),
}

impl CacheValue {
    /// Short type name used in wrong-type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            CacheValue::Int(_) => "int",
            CacheValue::Text(_) => "text",
            CacheValue::Sorted(_) => "sorted set",
            CacheValue::Set(_) => "set",
        }
    }
}

// == Cache Entry ==
/// Represents a single keyspace entry with value and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: CacheValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    pub fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl.as_millis() as u64),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    // == Expire / Persist ==
    /// Restarts the expiry clock at `ttl` from now.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(current_timestamp_ms() + ttl.as_millis() as u64);
    }

    /// Clears the expiry; the entry lives until explicitly removed.
    pub fn persist(&mut self) {
        self.expires_at = None;
    }

    pub fn is_persistent(&self) -> bool {
        self.expires_at.is_none()
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired (TTL elapsed)
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
