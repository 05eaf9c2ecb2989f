//! Sorted Set Module
//!
//! Score-ordered member set backing every recency list, with bounded insert
//! and the two eviction policies.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

// == Eviction Policy ==
/// What a full list drops to make room for a new member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Drop exactly the lowest-score member
    Single,
    /// Drop the `capacity / fraction` lowest-score members at once
    Batch { fraction: usize },
}

impl EvictionPolicy {
    /// Number of members removed when a list of `capacity` is full.
    pub fn evict_count(&self, capacity: usize) -> usize {
        match self {
            EvictionPolicy::Single => 1,
            EvictionPolicy::Batch { fraction } => (capacity / (*fraction).max(1)).max(1),
        }
    }
}

// == Items ==
/// One list member as stored and as returned by range reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZItem {
    pub member: u64,
    pub score: i64,
    /// Embedded record, present for lists that store redundant copies
    pub snapshot: Option<String>,
}

impl ZItem {
    pub fn new(member: u64, score: i64, snapshot: Option<String>) -> Self {
        Self {
            member,
            score,
            snapshot,
        }
    }

    pub fn bare(member: u64, score: i64) -> Self {
        Self::new(member, score, None)
    }
}

/// Result of a bounded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZAddOutcome {
    /// New member stored after evicting `evicted` older ones
    Inserted { evicted: usize },
    /// Member was already present; score and snapshot refreshed
    Updated,
    /// List is full and the member is older than everything in it
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    score: i64,
    snapshot: Option<String>,
}

// == Sorted Set ==
/// Members ordered by `(score, member)`.
///
/// A set filled from the store is complete down to its `floor`: every owner
/// member scoring at least `floor` is present. Evictions raise the floor.
/// Sets created by a write on a cold key have no floor (partial) until the
/// next fill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    slots: HashMap<u64, Slot>,
    order: BTreeSet<(i64, u64)>,
    floor: Option<i64>,
}

impl SortedSet {
    /// An empty set, either exhaustive (`complete`) or partial.
    pub fn new(complete: bool) -> Self {
        Self {
            floor: complete.then_some(i64::MIN),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.floor.is_some()
    }

    /// Lowest score below which members may be missing; `None` while partial.
    pub fn floor(&self) -> Option<i64> {
        self.floor
    }

    /// Declares every member scoring at least `floor` present.
    pub fn mark_complete(&mut self, floor: i64) {
        self.floor = Some(self.floor.map_or(floor, |current| current.max(floor)));
    }

    /// Records that a member scoring `score` exists but is not held.
    fn raise_floor(&mut self, score: i64) {
        if let Some(floor) = self.floor.as_mut() {
            *floor = (*floor).max(score.saturating_add(1));
        }
    }

    pub fn score(&self, member: u64) -> Option<i64> {
        self.slots.get(&member).map(|slot| slot.score)
    }

    pub fn min_score(&self) -> Option<i64> {
        self.order.first().map(|(score, _)| *score)
    }

    /// Inserts or updates a member without any capacity check.
    ///
    /// Returns true when the member was not present before.
    pub fn insert(&mut self, item: ZItem) -> bool {
        let is_new = match self.slots.get(&item.member) {
            Some(old) => {
                self.order.remove(&(old.score, item.member));
                false
            }
            None => true,
        };
        self.order.insert((item.score, item.member));
        self.slots.insert(
            item.member,
            Slot {
                score: item.score,
                snapshot: item.snapshot,
            },
        );
        is_new
    }

    pub fn remove(&mut self, member: u64) -> bool {
        match self.slots.remove(&member) {
            Some(slot) => {
                self.order.remove(&(slot.score, member));
                true
            }
            None => false,
        }
    }

    /// Removes and returns up to `n` lowest-score members.
    pub fn pop_min(&mut self, n: usize) -> Vec<u64> {
        let mut popped = Vec::with_capacity(n.min(self.len()));
        while popped.len() < n {
            match self.order.pop_first() {
                Some((score, member)) => {
                    self.slots.remove(&member);
                    self.raise_floor(score);
                    popped.push(member);
                }
                None => break,
            }
        }
        popped
    }

    // == Bounded Add ==
    /// Inserts `item`, evicting per `policy` when `capacity` is reached.
    pub fn add_bounded(
        &mut self,
        item: ZItem,
        capacity: usize,
        policy: EvictionPolicy,
    ) -> ZAddOutcome {
        if self.slots.contains_key(&item.member) {
            self.insert(item);
            return ZAddOutcome::Updated;
        }

        let mut evicted = 0;
        if self.len() >= capacity {
            if self.min_score().is_some_and(|min| item.score < min) {
                self.raise_floor(item.score);
                return ZAddOutcome::Skipped;
            }
            // Overfull sets (capacity lowered at runtime) shrink back under the cap.
            let overflow = self.len() + 1 - capacity;
            let n = policy.evict_count(capacity).max(overflow);
            evicted = self.pop_min(n).len();
        }

        self.insert(item);
        ZAddOutcome::Inserted { evicted }
    }

    // == Range ==
    /// Returns up to `limit` members with `score <= max_score`, newest first.
    pub fn range_rev(&self, max_score: i64, limit: usize) -> Vec<ZItem> {
        self.order
            .range(..=(max_score, u64::MAX))
            .rev()
            .take(limit)
            .map(|&(score, member)| ZItem {
                member,
                score,
                snapshot: self.slots.get(&member).and_then(|s| s.snapshot.clone()),
            })
            .collect()
    }

    /// Members in descending score order.
    pub fn members_rev(&self) -> Vec<u64> {
        self.order.iter().rev().map(|&(_, member)| member).collect()
    }
}
