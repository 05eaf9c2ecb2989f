//! Cache Module
//!
//! In-process keyspace with TTL expiration and atomic bundles, plus the
//! recency lists, counters and pending-delete markers built on top of it.

mod bundle;
mod counter;
mod entry;
mod keys;
mod keyspace;
mod pending;
mod pool;
mod recency;
mod stats;
mod store;
mod zset;


// Re-export public types
pub use bundle::{take, Bundle, CacheOp, ListState, ListWindow, OpResult};
pub use counter::{CounterCache, CounterLookup, CounterSpec};
pub use entry::{CacheEntry, CacheValue};
pub use keys::{video_key, CounterKind, ListKind};
pub use keyspace::{KeyTtl, Keyspace};
pub use pending::PendingDeleteSet;
pub use pool::{Pool, PoolGuard};
pub use recency::RecencyList;
pub use stats::CacheStats;
pub use store::CacheStore;
pub use zset::{EvictionPolicy, SortedSet, ZAddOutcome, ZItem};
