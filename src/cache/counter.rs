//! Counter Cache Module
//!
//! Per-entity integer counters with a sliding TTL and one-way promotion:
//! a counter that reaches its threshold stops expiring, and stays that way
//! even if it later drops back below the threshold.

use std::time::Duration;

use crate::cache::{Bundle, CacheOp, CacheStore};
use crate::error::Result;

/// Expiry and promotion threshold of one counter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSpec {
    pub ttl: Duration,
    pub threshold: i64,
}

impl CounterSpec {
    pub fn new(ttl: Duration, threshold: i64) -> Self {
        Self { ttl, threshold }
    }
}

/// What the cache knows about a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterLookup {
    /// The cache holds this value (zero included)
    Found(i64),
    /// The cache has no opinion; ask the store
    NotFound,
}

impl CounterLookup {
    pub fn value(&self) -> Option<i64> {
        match self {
            CounterLookup::Found(v) => Some(*v),
            CounterLookup::NotFound => None,
        }
    }
}

impl From<Option<i64>> for CounterLookup {
    fn from(value: Option<i64>) -> Self {
        value.map_or(CounterLookup::NotFound, CounterLookup::Found)
    }
}

// == Counter Cache ==
#[derive(Debug, Clone)]
pub struct CounterCache {
    store: CacheStore,
}

impl CounterCache {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    // == Bundle Builders ==
    /// Adjusts a counter by `delta`. With `create` unset a cold counter is
    /// left cold, so the next read still falls back to the store.
    pub fn adjust_op(key: String, delta: i64, spec: CounterSpec, create: bool) -> CacheOp {
        CacheOp::CounterAdjust {
            key,
            delta,
            ttl: spec.ttl,
            threshold: spec.threshold,
            create,
        }
    }

    /// Seeds a counter from an authoritative store count.
    pub fn seed_op(key: String, value: i64, spec: CounterSpec) -> CacheOp {
        CacheOp::CounterSet {
            key,
            value,
            ttl: spec.ttl,
            threshold: spec.threshold,
        }
    }

    /// Reads a counter and slides its TTL.
    pub fn get_op(key: String, spec: CounterSpec) -> CacheOp {
        CacheOp::CounterGet {
            key,
            ttl: Some(spec.ttl),
        }
    }

    // == Operations ==
    /// Adds one, starting from zero when the counter does not exist.
    pub async fn incr(&self, key: &str, ttl: Duration, threshold: i64) -> Result<i64> {
        self.adjust(key, 1, CounterSpec::new(ttl, threshold)).await
    }

    /// Subtracts one, never going below zero.
    pub async fn decr(&self, key: &str, ttl: Duration, threshold: i64) -> Result<i64> {
        self.adjust(key, -1, CounterSpec::new(ttl, threshold)).await
    }

    async fn adjust(&self, key: &str, delta: i64, spec: CounterSpec) -> Result<i64> {
        let mut replies = self
            .store
            .atomic(Bundle::from(Self::adjust_op(key.to_string(), delta, spec, true)))
            .await?;
        Ok(replies
            .pop()
            .map(|reply| reply.into_int())
            .transpose()?
            .flatten()
            .unwrap_or_default())
    }

    /// Reads a counter without touching its TTL.
    pub async fn get(&self, key: &str) -> Result<CounterLookup> {
        let mut replies = self
            .store
            .atomic(Bundle::from(CacheOp::CounterGet {
                key: key.to_string(),
                ttl: None,
            }))
            .await?;
        Ok(replies
            .pop()
            .map(|reply| reply.into_int())
            .transpose()?
            .flatten()
            .into())
    }

    pub async fn seed(&self, key: &str, value: i64, spec: CounterSpec) -> Result<()> {
        self.store
            .atomic(Bundle::from(Self::seed_op(key.to_string(), value, spec)))
            .await
            .map(|_| ())
    }
}
