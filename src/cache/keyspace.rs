//! Keyspace Module
//!
//! In-process cache engine: typed entries with TTL expiration, executed one
//! atomic bundle at a time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use crate::cache::{
    CacheEntry, CacheOp, CacheStats, CacheValue, ListState, ListWindow, OpResult, SortedSet,
    ZAddOutcome,
};
use crate::error::{AppError, Result};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    ExpiresInMs(u64),
}

/// Pre-bundle state of every key a bundle touched, restored on failure.
#[derive(Default)]
struct UndoLog {
    saved: Vec<(String, Option<CacheEntry>)>,
    seen: HashSet<String>,
}

fn wrong_type(key: &str, expected: &str, found: &CacheValue) -> AppError {
    AppError::Internal(format!(
        "WRONGTYPE key '{}' holds a {}, expected {}",
        key,
        found.type_name(),
        expected
    ))
}

// == Keyspace ==
/// Key to entry map with statistics.
#[derive(Debug, Default)]
pub struct Keyspace {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Performance statistics
    stats: CacheStats,
}

impl Keyspace {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Apply ==
    /// Executes `ops` in order as one unit.
    ///
    /// If any operation fails, every key touched by the bundle is restored to
    /// its state before the bundle and the error is returned.
    pub fn apply(&mut self, ops: Vec<CacheOp>) -> Result<Vec<OpResult>> {
        let mut undo = UndoLog::default();
        let mut replies = Vec::with_capacity(ops.len());

        for op in ops {
            match self.apply_one(op, &mut undo) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    self.rollback(undo);
                    self.stats.record_bundle(false);
                    return Err(err);
                }
            }
        }

        self.stats.record_bundle(true);
        self.stats.set_total_entries(self.entries.len());
        Ok(replies)
    }

    fn rollback(&mut self, undo: UndoLog) {
        for (key, previous) in undo.saved.into_iter().rev() {
            match previous {
                Some(entry) => {
                    self.entries.insert(key, entry);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Records the current state of `key` once per bundle.
    fn save(&mut self, key: &str, undo: &mut UndoLog) {
        if undo.seen.insert(key.to_string()) {
            undo.saved
                .push((key.to_string(), self.entries.get(key).cloned()));
        }
    }

    /// Returns the live entry for `key`, dropping it first if it expired.
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.get(key).is_some_and(CacheEntry::is_expired) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn record_read(&mut self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }

    fn apply_one(&mut self, op: CacheOp, undo: &mut UndoLog) -> Result<OpResult> {
        match op {
            CacheOp::Get { key } => self.get(&key, None),
            CacheOp::GetEx { key, ttl } => {
                self.save(&key, undo);
                self.get(&key, Some(ttl))
            }
            CacheOp::SetEx { key, value, ttl } => {
                self.save(&key, undo);
                self.entries
                    .insert(key, CacheEntry::new(CacheValue::Text(value), Some(ttl)));
                Ok(OpResult::Done)
            }
            CacheOp::Exists { key } => Ok(OpResult::Bool(self.live(&key).is_some())),
            CacheOp::Del { key } => {
                self.save(&key, undo);
                let existed = self.live(&key).is_some();
                self.entries.remove(&key);
                Ok(OpResult::Bool(existed))
            }
            CacheOp::Expire { key, ttl } => {
                self.save(&key, undo);
                Ok(OpResult::Bool(match self.live(&key) {
                    Some(entry) => {
                        entry.expire_in(ttl);
                        true
                    }
                    None => false,
                }))
            }
            CacheOp::CounterAdjust {
                key,
                delta,
                ttl,
                threshold,
                create,
            } => {
                self.save(&key, undo);
                self.counter_adjust(&key, delta, ttl, threshold, create)
            }
            CacheOp::CounterSet {
                key,
                value,
                ttl,
                threshold,
            } => {
                self.save(&key, undo);
                self.counter_set(&key, value, ttl, threshold)
            }
            CacheOp::CounterGet { key, ttl } => {
                self.save(&key, undo);
                self.counter_get(&key, ttl)
            }
            CacheOp::ZAdd {
                key,
                item,
                capacity,
                policy,
                ttl,
                unique,
            } => {
                self.save(&key, undo);
                let set = self.sorted_mut(&key, true)?;
                if unique && set.score(item.member).is_some() {
                    return Err(AppError::Duplicate(format!(
                        "{} already holds {}",
                        key, item.member
                    )));
                }
                let outcome = set.add_bounded(item, capacity, policy);
                if let ZAddOutcome::Inserted { evicted } = outcome {
                    self.stats.record_evictions(evicted as u64);
                }
                self.expire_existing(&key, ttl);
                Ok(OpResult::Added(outcome))
            }
            CacheOp::ZFill {
                key,
                items,
                floor,
                capacity,
                policy,
                ttl,
            } => {
                self.save(&key, undo);
                let set = self.sorted_mut(&key, true)?;
                set.mark_complete(floor);
                let mut evicted = 0;
                for item in items {
                    if let ZAddOutcome::Inserted { evicted: n } =
                        set.add_bounded(item, capacity, policy)
                    {
                        evicted += n;
                    }
                }
                self.stats.record_evictions(evicted as u64);
                self.expire_existing(&key, ttl);
                Ok(OpResult::Done)
            }
            CacheOp::ZRem { key, member } => {
                self.save(&key, undo);
                if self.live(&key).is_none() {
                    return Ok(OpResult::Bool(false));
                }
                let set = self.sorted_mut(&key, false)?;
                Ok(OpResult::Bool(set.remove(member)))
            }
            CacheOp::ZRangeRev {
                key,
                max_score,
                limit,
                ttl,
            } => {
                self.save(&key, undo);
                self.zrange_rev(&key, max_score, limit, ttl)
            }
            CacheOp::ZScore { key, member, ttl } => {
                self.save(&key, undo);
                let score = match self.live(&key) {
                    None => None,
                    Some(entry) => match &entry.value {
                        CacheValue::Sorted(set) => {
                            let score = set.score(member);
                            entry.expire_in(ttl);
                            score
                        }
                        other => return Err(wrong_type(&key, "sorted set", other)),
                    },
                };
                self.record_read(score.is_some());
                Ok(OpResult::Int(score))
            }
            CacheOp::SAdd { key, member, ttl } => {
                self.save(&key, undo);
                let added = match self.live(&key) {
                    None => {
                        let set = BTreeSet::from([member]);
                        self.entries
                            .insert(key.clone(), CacheEntry::new(CacheValue::Set(set), None));
                        true
                    }
                    Some(entry) => match &mut entry.value {
                        CacheValue::Set(set) => set.insert(member),
                        other => return Err(wrong_type(&key, "set", other)),
                    },
                };
                self.expire_existing(&key, ttl);
                Ok(OpResult::Bool(added))
            }
            CacheOp::SRem { key, member } => {
                self.save(&key, undo);
                let (removed, now_empty) = match self.live(&key) {
                    None => (false, false),
                    Some(entry) => match &mut entry.value {
                        CacheValue::Set(set) => (set.remove(&member), set.is_empty()),
                        other => return Err(wrong_type(&key, "set", other)),
                    },
                };
                if now_empty {
                    self.entries.remove(&key);
                }
                Ok(OpResult::Bool(removed))
            }
            CacheOp::SIsMember { key, member } => Ok(OpResult::Bool(match self.live(&key) {
                None => false,
                Some(entry) => match &entry.value {
                    CacheValue::Set(set) => set.contains(&member),
                    other => return Err(wrong_type(&key, "set", other)),
                },
            })),
            CacheOp::SMembers { key } => Ok(OpResult::Members(match self.live(&key) {
                None => Vec::new(),
                Some(entry) => match &entry.value {
                    CacheValue::Set(set) => set.iter().copied().collect(),
                    other => return Err(wrong_type(&key, "set", other)),
                },
            })),
        }
    }

    // == Primitive Helpers ==
    fn get(&mut self, key: &str, refresh: Option<Duration>) -> Result<OpResult> {
        let value = match self.live(key) {
            None => None,
            Some(entry) => {
                let text = match &entry.value {
                    CacheValue::Text(text) => text.clone(),
                    CacheValue::Int(v) => v.to_string(),
                    other => return Err(wrong_type(key, "text", other)),
                };
                if let Some(ttl) = refresh {
                    entry.expire_in(ttl);
                }
                Some(text)
            }
        };
        self.record_read(value.is_some());
        Ok(OpResult::Text(value))
    }

    fn expire_existing(&mut self, key: &str, ttl: Duration) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expire_in(ttl);
        }
    }

    fn sorted_mut(&mut self, key: &str, create: bool) -> Result<&mut SortedSet> {
        if self.live(key).is_none() {
            if !create {
                return Err(AppError::Internal(format!("no such key '{key}'")));
            }
            self.entries.insert(
                key.to_string(),
                CacheEntry::new(CacheValue::Sorted(SortedSet::new(false)), None),
            );
        }
        match self.entries.get_mut(key) {
            Some(CacheEntry {
                value: CacheValue::Sorted(set),
                ..
            }) => Ok(set),
            Some(entry) => Err(wrong_type(key, "sorted set", &entry.value)),
            None => Err(AppError::Internal(format!("no such key '{key}'"))),
        }
    }

    fn counter_adjust(
        &mut self,
        key: &str,
        delta: i64,
        ttl: Duration,
        threshold: i64,
        create: bool,
    ) -> Result<OpResult> {
        if self.live(key).is_none() {
            if !create {
                return Ok(OpResult::Int(None));
            }
            self.entries.insert(
                key.to_string(),
                CacheEntry::new(CacheValue::Int(0), Some(ttl)),
            );
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(OpResult::Int(None));
        };
        let CacheValue::Int(current) = entry.value else {
            return Err(wrong_type(key, "int", &entry.value));
        };

        let value = current.saturating_add(delta).max(0);
        entry.value = CacheValue::Int(value);
        if entry.is_persistent() || value >= threshold {
            entry.persist();
        } else {
            entry.expire_in(ttl);
        }
        Ok(OpResult::Int(Some(value)))
    }

    fn counter_set(
        &mut self,
        key: &str,
        value: i64,
        ttl: Duration,
        threshold: i64,
    ) -> Result<OpResult> {
        let value = value.max(0);
        let was_persistent = match self.live(key) {
            None => false,
            Some(entry) => match &entry.value {
                CacheValue::Int(_) => entry.is_persistent(),
                other => return Err(wrong_type(key, "int", other)),
            },
        };
        let mut entry = CacheEntry::new(CacheValue::Int(value), Some(ttl));
        if was_persistent || value >= threshold {
            entry.persist();
        }
        self.entries.insert(key.to_string(), entry);
        Ok(OpResult::Done)
    }

    fn counter_get(&mut self, key: &str, ttl: Option<Duration>) -> Result<OpResult> {
        let value = match self.live(key) {
            None => None,
            Some(entry) => {
                let CacheValue::Int(value) = entry.value else {
                    return Err(wrong_type(key, "int", &entry.value));
                };
                if let (Some(ttl), false) = (ttl, entry.is_persistent()) {
                    entry.expire_in(ttl);
                }
                Some(value)
            }
        };
        self.record_read(value.is_some());
        Ok(OpResult::Int(value))
    }

    fn zrange_rev(
        &mut self,
        key: &str,
        max_score: i64,
        limit: usize,
        ttl: Duration,
    ) -> Result<OpResult> {
        let window = match self.live(key) {
            None => ListWindow::missing(),
            Some(entry) => {
                let CacheValue::Sorted(set) = &entry.value else {
                    return Err(wrong_type(key, "sorted set", &entry.value));
                };
                let window = ListWindow {
                    items: set.range_rev(max_score, limit),
                    state: match set.floor() {
                        Some(floor) => ListState::Complete { floor },
                        None => ListState::Partial,
                    },
                };
                entry.expire_in(ttl);
                window
            }
        };
        self.record_read(window.state != ListState::Missing);
        Ok(OpResult::Window(window))
    }

    // == Inspection ==
    /// Remaining lifetime of `key`.
    pub fn ttl(&mut self, key: &str) -> KeyTtl {
        match self.live(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.ttl_remaining_ms() {
                None => KeyTtl::Persistent,
                Some(ms) => KeyTtl::ExpiresInMs(ms),
            },
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the keyspace.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        self.stats.set_total_entries(self.entries.len());
        before - self.entries.len()
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EvictionPolicy, ZItem};
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn apply(ks: &mut Keyspace, op: CacheOp) -> OpResult {
        ks.apply(vec![op]).unwrap().remove(0)
    }

    fn zadd(key: &str, member: u64, score: i64, capacity: usize) -> CacheOp {
        CacheOp::ZAdd {
            key: key.into(),
            item: ZItem::bare(member, score),
            capacity,
            policy: EvictionPolicy::Single,
            ttl: TTL,
            unique: false,
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut ks = Keyspace::new();
        apply(
            &mut ks,
            CacheOp::SetEx {
                key: "k".into(),
                value: "v".into(),
                ttl: TTL,
            },
        );

        let reply = apply(&mut ks, CacheOp::Get { key: "k".into() });
        assert_eq!(reply, OpResult::Text(Some("v".into())));
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_get_nonexistent_is_miss() {
        let mut ks = Keyspace::new();
        let reply = apply(&mut ks, CacheOp::Get { key: "nope".into() });
        assert_eq!(reply, OpResult::Text(None));
        assert_eq!(ks.stats().misses, 1);
    }

    #[test]
    fn test_ttl_expiration() {
        let mut ks = Keyspace::new();
        apply(
            &mut ks,
            CacheOp::SetEx {
                key: "k".into(),
                value: "v".into(),
                ttl: Duration::from_millis(200),
            },
        );
        sleep(Duration::from_millis(300));

        assert_eq!(apply(&mut ks, CacheOp::Get { key: "k".into() }), OpResult::Text(None));
        assert!(ks.is_empty());
    }

    #[test]
    fn test_failed_bundle_leaves_no_trace() {
        let mut ks = Keyspace::new();
        apply(
            &mut ks,
            CacheOp::SetEx {
                key: "text".into(),
                value: "v".into(),
                ttl: TTL,
            },
        );

        let result = ks.apply(vec![
            zadd("list", 1, 10, 5),
            CacheOp::CounterAdjust {
                key: "text".into(),
                delta: 1,
                ttl: TTL,
                threshold: 100,
                create: true,
            },
        ]);

        assert!(result.is_err());
        assert_eq!(ks.stats().rolled_back, 1);
        assert_eq!(ks.ttl("list"), KeyTtl::Missing);
        assert_eq!(
            apply(&mut ks, CacheOp::Get { key: "text".into() }),
            OpResult::Text(Some("v".into()))
        );
    }

    #[test]
    fn test_unique_add_of_present_member_rolls_back() {
        let mut ks = Keyspace::new();
        apply(&mut ks, zadd("list", 1, 10, 5));

        let mut duplicate = zadd("list", 1, 20, 5);
        if let CacheOp::ZAdd { unique, .. } = &mut duplicate {
            *unique = true;
        }
        let result = ks.apply(vec![
            CacheOp::CounterAdjust {
                key: "c".into(),
                delta: 1,
                ttl: TTL,
                threshold: 100,
                create: true,
            },
            duplicate,
        ]);

        assert!(matches!(result, Err(AppError::Duplicate(_))));
        assert_eq!(ks.ttl("c"), KeyTtl::Missing);
    }

    #[test]
    fn test_counter_adjust_clamps_and_promotes() {
        let mut ks = Keyspace::new();
        let adjust = |delta| CacheOp::CounterAdjust {
            key: "c".into(),
            delta,
            ttl: TTL,
            threshold: 2,
            create: true,
        };

        assert_eq!(apply(&mut ks, adjust(-1)), OpResult::Int(Some(0)));
        assert_eq!(apply(&mut ks, adjust(1)), OpResult::Int(Some(1)));
        assert!(matches!(ks.ttl("c"), KeyTtl::ExpiresInMs(_)));
        assert_eq!(apply(&mut ks, adjust(1)), OpResult::Int(Some(2)));
        assert_eq!(ks.ttl("c"), KeyTtl::Persistent);
        assert_eq!(apply(&mut ks, adjust(-1)), OpResult::Int(Some(1)));
        assert_eq!(ks.ttl("c"), KeyTtl::Persistent);
    }

    #[test]
    fn test_counter_adjust_without_create_leaves_cold_key() {
        let mut ks = Keyspace::new();
        let reply = apply(
            &mut ks,
            CacheOp::CounterAdjust {
                key: "c".into(),
                delta: 1,
                ttl: TTL,
                threshold: 10,
                create: false,
            },
        );
        assert_eq!(reply, OpResult::Int(None));
        assert_eq!(ks.ttl("c"), KeyTtl::Missing);
    }

    #[test]
    fn test_zadd_creates_partial_list_and_fill_completes_it() {
        let mut ks = Keyspace::new();
        apply(&mut ks, zadd("l", 1, 10, 3));

        let range = CacheOp::ZRangeRev {
            key: "l".into(),
            max_score: i64::MAX,
            limit: 3,
            ttl: TTL,
        };
        let window = apply(&mut ks, range.clone()).into_window().unwrap();
        assert_eq!(window.state, ListState::Partial);

        apply(
            &mut ks,
            CacheOp::ZFill {
                key: "l".into(),
                items: vec![ZItem::bare(2, 5), ZItem::bare(3, 7)],
                floor: i64::MIN,
                capacity: 3,
                policy: EvictionPolicy::Single,
                ttl: TTL,
            },
        );
        let window = apply(&mut ks, range).into_window().unwrap();
        assert!(window.is_exhaustive());
        let members: Vec<u64> = window.items.iter().map(|i| i.member).collect();
        assert_eq!(members, vec![1, 3, 2]);
    }

    #[test]
    fn test_zadd_records_evictions() {
        let mut ks = Keyspace::new();
        for i in 1..=4 {
            apply(&mut ks, zadd("l", i, i as i64, 3));
        }
        assert_eq!(ks.stats().evictions, 1);
    }

    #[test]
    fn test_set_ops_delete_empty_set() {
        let mut ks = Keyspace::new();
        apply(
            &mut ks,
            CacheOp::SAdd {
                key: "s".into(),
                member: 7,
                ttl: TTL,
            },
        );
        assert_eq!(
            apply(&mut ks, CacheOp::SIsMember { key: "s".into(), member: 7 }),
            OpResult::Bool(true)
        );
        apply(&mut ks, CacheOp::SRem { key: "s".into(), member: 7 });
        assert_eq!(ks.ttl("s"), KeyTtl::Missing);
    }

    #[test]
    fn test_cleanup_expired() {
        let mut ks = Keyspace::new();
        ks.apply(vec![
            CacheOp::SetEx {
                key: "short".into(),
                value: "v".into(),
                ttl: Duration::from_millis(200),
            },
            CacheOp::SetEx {
                key: "long".into(),
                value: "v".into(),
                ttl: Duration::from_secs(10),
            },
        ])
        .unwrap();

        sleep(Duration::from_millis(300));

        assert_eq!(ks.cleanup_expired(), 1);
        assert_eq!(ks.len(), 1);
    }
}
