//! Recency List Module
//!
//! Bounded, time-ordered member lists. One `RecencyList` handle serves one
//! list family (follow, feed, ...) and addresses owners by id; the eviction
//! policy comes from the family's configuration.

use crate::cache::{take, Bundle, CacheOp, CacheStore, ListKind, ListWindow, ZAddOutcome, ZItem};
use crate::config::ListConfig;
use crate::error::Result;

// == Recency List ==
#[derive(Debug, Clone)]
pub struct RecencyList {
    store: CacheStore,
    kind: ListKind,
    config: ListConfig,
}

impl RecencyList {
    pub fn new(store: CacheStore, kind: ListKind, config: ListConfig) -> Self {
        Self {
            store,
            kind,
            config,
        }
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    pub fn key(&self, owner: u64) -> String {
        self.kind.key(owner)
    }

    // == Bundle Builders ==
    /// Evict-if-full, insert and refresh TTL, as one operation.
    pub fn add_op(&self, owner: u64, item: ZItem) -> CacheOp {
        CacheOp::ZAdd {
            key: self.key(owner),
            item,
            capacity: self.config.capacity,
            policy: self.config.eviction,
            ttl: self.config.ttl(),
            unique: false,
        }
    }

    /// Like `add_op`, but the bundle fails with `Duplicate` when the member
    /// is already cached.
    pub fn insert_new_op(&self, owner: u64, item: ZItem) -> CacheOp {
        CacheOp::ZAdd {
            key: self.key(owner),
            item,
            capacity: self.config.capacity,
            policy: self.config.eviction,
            ttl: self.config.ttl(),
            unique: true,
        }
    }

    /// Loads store rows and marks the list complete down to `floor`.
    pub fn fill_op(&self, owner: u64, items: Vec<ZItem>, floor: i64) -> CacheOp {
        CacheOp::ZFill {
            key: self.key(owner),
            items,
            floor,
            capacity: self.config.capacity,
            policy: self.config.eviction,
            ttl: self.config.ttl(),
        }
    }

    pub fn remove_op(&self, owner: u64, member: u64) -> CacheOp {
        CacheOp::ZRem {
            key: self.key(owner),
            member,
        }
    }

    pub fn range_op(&self, owner: u64, max_score: i64, limit: usize) -> CacheOp {
        CacheOp::ZRangeRev {
            key: self.key(owner),
            max_score,
            limit,
            ttl: self.config.ttl(),
        }
    }

    pub fn score_op(&self, owner: u64, member: u64) -> CacheOp {
        CacheOp::ZScore {
            key: self.key(owner),
            member,
            ttl: self.config.ttl(),
        }
    }

    // == Operations ==
    pub async fn add(
        &self,
        owner: u64,
        member: u64,
        score: i64,
        snapshot: Option<String>,
    ) -> Result<ZAddOutcome> {
        let mut replies = self
            .store
            .atomic(Bundle::from(
                self.add_op(owner, ZItem::new(member, score, snapshot)),
            ))
            .await?;
        take(&mut replies, 0)?.into_added()
    }

    pub async fn remove(&self, owner: u64, member: u64) -> Result<bool> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.remove_op(owner, member)))
            .await?;
        take(&mut replies, 0)?.into_bool()
    }

    /// Newest-first members with `score <= max_score`, at most `limit`.
    /// Reading slides the list TTL.
    pub async fn range_by_score(
        &self,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> Result<ListWindow> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.range_op(owner, max_score, limit)))
            .await?;
        take(&mut replies, 0)?.into_window()
    }

    /// Whether the cached list holds `member`. `false` means "not cached",
    /// not "absent".
    pub async fn contains(&self, owner: u64, member: u64) -> Result<bool> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.score_op(owner, member)))
            .await?;
        Ok(take(&mut replies, 0)?.into_int()?.is_some())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ListState;
    use std::time::Duration;

    fn list(kind: ListKind, config: ListConfig) -> RecencyList {
        RecencyList::new(
            CacheStore::new(4, Duration::from_millis(100)),
            kind,
            config,
        )
    }

    fn members(window: &ListWindow) -> Vec<u64> {
        window.items.iter().map(|item| item.member).collect()
    }

    #[tokio::test]
    async fn test_single_eviction_keeps_newest() {
        let list = list(ListKind::Follow, ListConfig::per_owner(3, 60));
        for score in 1..=4 {
            list.add(7, score as u64, score, None).await.unwrap();
        }

        let window = list.range_by_score(7, i64::MAX, 10).await.unwrap();
        assert_eq!(members(&window), vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_batch_eviction_drops_tenth() {
        let list = list(ListKind::Feed, ListConfig::shared(10, 60, 10, 5));
        for score in 1..=10 {
            list.add(0, score as u64, score, None).await.unwrap();
        }

        let outcome = list.add(0, 11, 11, None).await.unwrap();
        assert_eq!(outcome, ZAddOutcome::Inserted { evicted: 1 });

        let window = list.range_by_score(0, i64::MAX, 20).await.unwrap();
        assert_eq!(window.items.len(), 10);
        assert!(!members(&window).contains(&1));
    }

    #[tokio::test]
    async fn test_range_respects_max_score_and_limit() {
        let list = list(ListKind::Publish, ListConfig::per_owner(10, 60));
        for score in [10, 20, 30, 40] {
            list.add(1, score as u64, score, Some(format!("v{score}")))
                .await
                .unwrap();
        }

        let window = list.range_by_score(1, 30, 2).await.unwrap();
        assert_eq!(members(&window), vec![30, 20]);
        assert_eq!(window.items[0].snapshot.as_deref(), Some("v30"));
    }

    #[tokio::test]
    async fn test_missing_list_reads_as_missing() {
        let list = list(ListKind::Comment, ListConfig::per_owner(5, 60));
        let window = list.range_by_score(9, i64::MAX, 5).await.unwrap();
        assert_eq!(window.state, ListState::Missing);
        assert!(window.items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_contains() {
        let list = list(ListKind::Favorite, ListConfig::per_owner(5, 60));
        list.add(1, 42, 100, None).await.unwrap();

        assert!(list.contains(1, 42).await.unwrap());
        assert!(list.remove(1, 42).await.unwrap());
        assert!(!list.contains(1, 42).await.unwrap());
        assert!(!list.remove(1, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_new_rejects_cached_member() {
        let list = list(ListKind::Favorite, ListConfig::per_owner(5, 60));
        list.add(1, 42, 100, None).await.unwrap();

        let result = list
            .store
            .atomic(Bundle::from(list.insert_new_op(1, ZItem::bare(42, 200))))
            .await;
        assert!(matches!(result, Err(crate::error::AppError::Duplicate(_))));
        assert_eq!(list.range_by_score(1, i64::MAX, 5).await.unwrap().items[0].score, 100);
    }

    #[tokio::test]
    async fn test_readd_updates_without_eviction() {
        let list = list(ListKind::Follow, ListConfig::per_owner(2, 60));
        list.add(1, 1, 1, None).await.unwrap();
        list.add(1, 2, 2, None).await.unwrap();

        assert_eq!(list.add(1, 1, 3, None).await.unwrap(), ZAddOutcome::Updated);
        let window = list.range_by_score(1, i64::MAX, 5).await.unwrap();
        assert_eq!(members(&window), vec![1, 2]);
    }
}
