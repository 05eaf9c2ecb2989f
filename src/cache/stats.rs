//! Cache Statistics Module
//!
//! Tracks keyspace reads, list evictions and bundle outcomes.

use serde::Serialize;

// == Cache Stats ==
/// Keyspace performance counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads that found their key
    pub hits: u64,
    /// Reads that found nothing (the caller falls back to the store)
    pub misses: u64,
    /// List members dropped by capacity eviction
    pub evictions: u64,
    /// Bundles applied
    pub bundles: u64,
    /// Bundles undone after a failing operation
    pub rolled_back: u64,
    /// Current number of keys
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if nothing was read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    pub fn record_bundle(&mut self, committed: bool) {
        self.bundles += 1;
        if !committed {
            self.rolled_back += 1;
        }
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
