//! Atomic Bundle Module
//!
//! A bundle is an ordered list of primitive keyspace operations submitted in
//! one round trip and applied as one indivisible unit: concurrent readers see
//! either none of its effects or all of them.

use std::time::Duration;

use crate::cache::{EvictionPolicy, ZAddOutcome, ZItem};
use crate::error::{AppError, Result};

// == Operations ==
/// One primitive keyspace command.
#[derive(Debug, Clone)]
pub enum CacheOp {
    /// Read a text or counter value
    Get { key: String },
    /// Read a value and restart its TTL
    GetEx { key: String, ttl: Duration },
    /// Store text with an expiry
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
    Exists { key: String },
    Del { key: String },
    Expire { key: String, ttl: Duration },

    /// Add `delta` to a counter, clamping at zero, then persist it when the
    /// threshold is reached or refresh its TTL otherwise. A persisted counter
    /// never gets a TTL back. Missing counters start at zero when `create`
    /// is set and are left alone otherwise.
    CounterAdjust {
        key: String,
        delta: i64,
        ttl: Duration,
        threshold: i64,
        create: bool,
    },
    /// Seed a counter from an authoritative count
    CounterSet {
        key: String,
        value: i64,
        ttl: Duration,
        threshold: i64,
    },
    /// Read a counter, refreshing its TTL unless it is persisted
    CounterGet { key: String, ttl: Option<Duration> },

    /// Bounded insert into a recency list, then refresh the list TTL. With
    /// `unique` set, an already present member fails the whole bundle with
    /// `Duplicate`.
    ZAdd {
        key: String,
        item: ZItem,
        capacity: usize,
        policy: EvictionPolicy,
        ttl: Duration,
        unique: bool,
    },
    /// Bounded insert of store rows, marking the list complete down to
    /// `floor`
    ZFill {
        key: String,
        items: Vec<ZItem>,
        floor: i64,
        capacity: usize,
        policy: EvictionPolicy,
        ttl: Duration,
    },
    ZRem { key: String, member: u64 },
    /// Newest-first members with `score <= max_score`, refreshing the TTL
    ZRangeRev {
        key: String,
        max_score: i64,
        limit: usize,
        ttl: Duration,
    },
    /// Score of one member, refreshing the list TTL when the list exists
    ZScore {
        key: String,
        member: u64,
        ttl: Duration,
    },

    SAdd {
        key: String,
        member: u64,
        ttl: Duration,
    },
    /// Remove a set member, deleting the set once it is empty
    SRem { key: String, member: u64 },
    SIsMember { key: String, member: u64 },
    SMembers { key: String },
}

// == List Window ==
/// Whether a list exists and how much of the owner's history it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Missing,
    /// Created by writes on a cold key; may lack older members
    Partial,
    /// Holds every member scoring at least `floor`
    Complete { floor: i64 },
}

/// Items read from a recency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListWindow {
    pub items: Vec<ZItem>,
    pub state: ListState,
}

impl ListWindow {
    pub fn missing() -> Self {
        Self {
            items: Vec::new(),
            state: ListState::Missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ListState::Complete { .. })
    }

    /// Whether the list holds the owner's entire history.
    pub fn is_exhaustive(&self) -> bool {
        self.state == ListState::Complete { floor: i64::MIN }
    }
}

// == Replies ==
/// Reply to one operation, in bundle order.
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    Done,
    Bool(bool),
    Int(Option<i64>),
    Text(Option<String>),
    Added(ZAddOutcome),
    Window(ListWindow),
    Members(Vec<u64>),
}

fn unexpected(expected: &str, got: &OpResult) -> AppError {
    AppError::Internal(format!("expected {expected} reply, got {got:?}"))
}

impl OpResult {
    pub fn into_bool(self) -> Result<bool> {
        match self {
            OpResult::Bool(b) => Ok(b),
            other => Err(unexpected("bool", &other)),
        }
    }

    pub fn into_int(self) -> Result<Option<i64>> {
        match self {
            OpResult::Int(v) => Ok(v),
            other => Err(unexpected("int", &other)),
        }
    }

    pub fn into_text(self) -> Result<Option<String>> {
        match self {
            OpResult::Text(v) => Ok(v),
            other => Err(unexpected("text", &other)),
        }
    }

    pub fn into_added(self) -> Result<ZAddOutcome> {
        match self {
            OpResult::Added(outcome) => Ok(outcome),
            other => Err(unexpected("add", &other)),
        }
    }

    pub fn into_window(self) -> Result<ListWindow> {
        match self {
            OpResult::Window(window) => Ok(window),
            other => Err(unexpected("window", &other)),
        }
    }

    pub fn into_members(self) -> Result<Vec<u64>> {
        match self {
            OpResult::Members(members) => Ok(members),
            other => Err(unexpected("members", &other)),
        }
    }
}

// == Bundle ==
/// Ordered operations to apply atomically.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    ops: Vec<CacheOp>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation and returns the index of its reply.
    pub fn push(&mut self, op: CacheOp) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Builder-style append.
    pub fn with(mut self, op: CacheOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }
}

impl From<CacheOp> for Bundle {
    fn from(op: CacheOp) -> Self {
        Bundle { ops: vec![op] }
    }
}

/// Takes the reply at `index` out of a bundle result.
pub fn take(replies: &mut [OpResult], index: usize) -> Result<OpResult> {
    replies
        .get_mut(index)
        .map(|reply| std::mem::replace(reply, OpResult::Done))
        .ok_or_else(|| AppError::Internal(format!("no reply at index {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_returns_reply_index() {
        let mut bundle = Bundle::new();
        assert!(bundle.is_empty());
        assert_eq!(bundle.push(CacheOp::Exists { key: "a".into() }), 0);
        assert_eq!(bundle.push(CacheOp::Del { key: "a".into() }), 1);
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn test_reply_conversions() {
        assert!(OpResult::Bool(true).into_bool().unwrap());
        assert_eq!(OpResult::Int(Some(3)).into_int().unwrap(), Some(3));
        assert!(OpResult::Done.into_window().is_err());
    }

    #[test]
    fn test_take_moves_reply_out() {
        let mut replies = vec![OpResult::Int(Some(1)), OpResult::Bool(false)];
        assert_eq!(take(&mut replies, 0).unwrap(), OpResult::Int(Some(1)));
        assert_eq!(replies[0], OpResult::Done);
        assert!(take(&mut replies, 5).is_err());
    }
}
