//! Engine
//!
//! Request-side core shared by every handler. Mutations update the cache in
//! one atomic bundle and then queue the matching store write; reads go
//! through the paginated resolver and fall back to the store on misses.

mod comment;
mod favorite;
mod relation;
mod video;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{
    take, Bundle, CacheOp, CacheStore, CounterCache, CounterKind, CounterLookup, ListKind,
    OpResult, PendingDeleteSet, RecencyList,
};
use crate::config::Config;
use crate::error::Result;
use crate::ids::IdGenerator;
use crate::models::{now_millis, ActionType};
use crate::models::responses::StatsResponse;
use crate::pagination::{row_to_item, PaginatedListResolver};
use crate::queue::{DeadLetter, Mutation, WriteBehindQueue};
use crate::store::{Record, RecordKey, SourceStore};

/// One handle per list family.
#[derive(Debug, Clone)]
struct Lists {
    follow: RecencyList,
    follower: RecencyList,
    publish: RecencyList,
    favorite: RecencyList,
    comment: RecencyList,
    feed: RecencyList,
}

impl Lists {
    fn new(cache: &CacheStore, config: &Config) -> Self {
        let list = |kind| RecencyList::new(cache.clone(), kind, config.cache.list(kind).clone());
        Self {
            follow: list(ListKind::Follow),
            follower: list(ListKind::Follower),
            publish: list(ListKind::Publish),
            favorite: list(ListKind::Favorite),
            comment: list(ListKind::Comment),
            feed: list(ListKind::Feed),
        }
    }

    fn get(&self, kind: ListKind) -> &RecencyList {
        match kind {
            ListKind::Follow => &self.follow,
            ListKind::Follower => &self.follower,
            ListKind::Publish => &self.publish,
            ListKind::Favorite => &self.favorite,
            ListKind::Comment => &self.comment,
            ListKind::Feed => &self.feed,
        }
    }
}

// == Engine ==
pub struct Engine {
    config: Arc<Config>,
    cache: CacheStore,
    store: Arc<dyn SourceStore>,
    queue: WriteBehindQueue,
    ids: Arc<dyn IdGenerator>,
    pending: PendingDeleteSet,
    resolver: PaginatedListResolver,
    lists: Lists,
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        cache: CacheStore,
        store: Arc<dyn SourceStore>,
        queue: WriteBehindQueue,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let pending = PendingDeleteSet::new(cache.clone(), config.cache.pending_delete_ttl());
        let resolver = PaginatedListResolver::new(cache.clone(), store.clone(), pending.clone());
        let lists = Lists::new(&cache, &config);
        Self {
            config,
            cache,
            store,
            queue,
            ids,
            pending,
            resolver,
            lists,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.store
    }

    pub fn queue(&self) -> &WriteBehindQueue {
        &self.queue
    }

    pub fn pending(&self) -> &PendingDeleteSet {
        &self.pending
    }

    pub fn list(&self, kind: ListKind) -> &RecencyList {
        self.lists.get(kind)
    }

    // == Write Path ==
    /// Applies a handler's cache bundle, then queues the store write. The
    /// cache change stays in place when queueing fails.
    async fn apply_then_enqueue(&self, bundle: Bundle, mutation: Mutation) -> Result<Vec<OpResult>> {
        let replies = self.cache.atomic(bundle).await?;
        self.queue.enqueue(&mutation).await?;
        Ok(replies)
    }

    /// Counter adjustment that leaves cold counters cold, so their next read
    /// is seeded from the store.
    fn counter_op(&self, kind: CounterKind, owner: u64, delta: i64) -> CacheOp {
        CounterCache::adjust_op(kind.key(owner), delta, self.config.cache.counter(kind), false)
    }

    // == Read Path ==
    /// Membership of `member` in `owner`'s list: cached means present, a
    /// pending delete means absent, and an exhaustive list that lacks it
    /// means absent. Anything else asks the store.
    async fn is_member(&self, kind: ListKind, owner: u64, member: u64, key: RecordKey) -> Result<bool> {
        let list = self.list(kind);
        let mut bundle = Bundle::new();
        let score = bundle.push(list.score_op(owner, member));
        let marked = bundle.push(self.pending.contains_op(kind, owner, member));
        let window = bundle.push(list.range_op(owner, i64::MAX, 0));
        let mut replies = self.cache.atomic(bundle).await?;

        if take(&mut replies, score)?.into_int()?.is_some() {
            return Ok(true);
        }
        if take(&mut replies, marked)?.into_bool()? {
            return Ok(false);
        }
        if take(&mut replies, window)?.into_window()?.is_exhaustive() {
            return Ok(false);
        }
        Ok(self.store.exists(&key).await?)
    }

    /// Counter values in request order. Misses are read from the store and
    /// seeded through `deferred`.
    async fn counts(&self, wanted: &[(CounterKind, u64)], deferred: &mut Bundle) -> Result<Vec<i64>> {
        let mut bundle = Bundle::new();
        for &(kind, owner) in wanted {
            bundle.push(CounterCache::get_op(kind.key(owner), self.config.cache.counter(kind)));
        }
        let replies = self.cache.atomic(bundle).await?;

        let mut values = Vec::with_capacity(wanted.len());
        for (&(kind, owner), reply) in wanted.iter().zip(replies) {
            let value = match CounterLookup::from(reply.into_int()?) {
                CounterLookup::Found(value) => value,
                CounterLookup::NotFound => {
                    let value = self.store.count(kind, owner).await?;
                    deferred.push(CounterCache::seed_op(
                        kind.key(owner),
                        value,
                        self.config.cache.counter(kind),
                    ));
                    value
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    // == Reconciliation Support ==
    /// Cache bundle undoing the optimistic update of an insert that never
    /// reached the store. The affected counters are dropped rather than
    /// decremented.
    pub fn rollback_bundle(&self, record: &Record) -> Bundle {
        let bundle = match record {
            Record::Favorite(f) => Bundle::new()
                .with(self.list(ListKind::Favorite).remove_op(f.user_id, f.video_id)),
            Record::Follow(f) => Bundle::new()
                .with(self.list(ListKind::Follow).remove_op(f.follower_id, f.followee_id))
                .with(self.list(ListKind::Follower).remove_op(f.followee_id, f.follower_id)),
            Record::Comment(c) => Bundle::new()
                .with(self.list(ListKind::Comment).remove_op(c.video_id, c.id)),
            Record::Video(v) => Bundle::new()
                .with(self.list(ListKind::Feed).remove_op(0, v.id))
                .with(self.list(ListKind::Publish).remove_op(v.author_id, v.id))
                .with(CacheOp::Del {
                    key: crate::cache::video_key(v.id),
                }),
        };
        self.recount_ops(&record.key())
            .into_iter()
            .fold(bundle, Bundle::with)
    }

    /// Drops the counters a mutation of `key` adjusted. A counter seeded
    /// while the mutation was queued missed it; the next read recounts.
    pub fn recount_ops(&self, key: &RecordKey) -> Vec<CacheOp> {
        let counters = match key {
            RecordKey::Favorite(k) => vec![CounterKind::Favorites.key(k.video_id)],
            RecordKey::Follow(k) => vec![
                CounterKind::Following.key(k.follower_id),
                CounterKind::Followers.key(k.followee_id),
            ],
            RecordKey::Comment(k) => vec![CounterKind::Comments.key(k.video_id)],
            RecordKey::Video(_) => Vec::new(),
        };
        counters.into_iter().map(|key| CacheOp::Del { key }).collect()
    }

    /// Pending-delete marker a queued delete of `key` left behind, if any.
    pub fn pending_marker(&self, key: &RecordKey) -> Option<CacheOp> {
        match key {
            RecordKey::Favorite(k) => {
                Some(self.pending.clear_op(ListKind::Favorite, k.user_id, k.video_id))
            }
            RecordKey::Follow(k) => {
                Some(self.pending.clear_op(ListKind::Follow, k.follower_id, k.followee_id))
            }
            RecordKey::Comment(k) => {
                Some(self.pending.clear_op(ListKind::Comment, k.video_id, k.id))
            }
            RecordKey::Video(_) => None,
        }
    }

    // == Operations ==
    /// Fills the global feed from the store's newest videos.
    pub async fn warm_up(&self) -> Result<usize> {
        let feed = self.list(ListKind::Feed);
        let capacity = feed.capacity();
        let rows = self
            .store
            .range(ListKind::Feed, 0, now_millis(), capacity)
            .await?;
        let floor = match rows.last() {
            Some(oldest) if rows.len() >= capacity => oldest.score.saturating_add(1),
            _ => i64::MIN,
        };
        let items = rows
            .into_iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>>>()?;
        let loaded = items.len();

        self.cache
            .atomic(Bundle::from(feed.fill_op(0, items, floor)))
            .await?;
        info!(videos = loaded, "Feed warmed up");
        Ok(loaded)
    }

    pub async fn stats(&self) -> StatsResponse {
        let stats = self.cache.stats().await;
        let log = self.queue.log();
        StatsResponse::new(&stats, log.lag().await, log.dead_letters().await.len())
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queue.log().dead_letters().await
    }
}

fn log_action(entity: &str, action: ActionType, subject: u64, object: u64) {
    debug!(entity, ?action, subject, object, "Action applied to cache");
}

// == Unit Tests ==
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ids::SnowflakeIds;
    use crate::models::Video;
    use crate::pagination::PageCursor;
    use crate::store::MemoryStore;

    pub(crate) struct Fixture {
        pub engine: Engine,
        pub store: Arc<MemoryStore>,
    }

    pub(crate) fn fixture() -> Fixture {
        let config = Arc::new(Config::default());
        let cache = CacheStore::from_config(&config.cache);
        let store = Arc::new(MemoryStore::new());
        let queue = WriteBehindQueue::with_partitions(config.queue.partitions);
        let engine = Engine::new(
            config,
            cache,
            store.clone(),
            queue,
            Arc::new(SnowflakeIds::new(1)),
        );
        Fixture { engine, store }
    }

    pub(crate) fn video(id: u64, author_id: u64, created_at: i64) -> Video {
        Video {
            id,
            author_id,
            title: format!("video {id}"),
            play_url: format!("https://cdn.example/{id}.mp4"),
            cover_url: String::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_warm_up_fills_feed_from_store() {
        let fx = fixture();
        for id in 1..=3 {
            fx.store.seed(Record::Video(video(id, 9, id as i64))).await;
        }

        assert_eq!(fx.engine.warm_up().await.unwrap(), 3);
        let queries = fx.store.queries();

        let page = fx.engine.feed(PageCursor::Latest, None).await.unwrap();
        let ids: Vec<u64> = page.items.iter().map(|v| v.video.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        // Only counter seeding reaches the store.
        assert_eq!(fx.store.queries(), queries + 6);
    }

    #[tokio::test]
    async fn test_counts_seed_misses_once() {
        let fx = fixture();
        fx.store.seed(Record::Video(video(1, 9, 1))).await;

        let mut deferred = Bundle::new();
        let wanted = [(CounterKind::Favorites, 1), (CounterKind::Comments, 1)];
        assert_eq!(fx.engine.counts(&wanted, &mut deferred).await.unwrap(), vec![0, 0]);
        assert_eq!(deferred.len(), 2);
        fx.engine.cache.atomic(deferred).await.unwrap();

        let queries = fx.store.queries();
        let mut deferred = Bundle::new();
        fx.engine.counts(&wanted, &mut deferred).await.unwrap();
        assert!(deferred.is_empty());
        assert_eq!(fx.store.queries(), queries);
    }

    #[tokio::test]
    async fn test_rollback_bundle_drops_counter() {
        let fx = fixture();
        let record = Record::Favorite(crate::models::Favorite {
            user_id: 1,
            video_id: 2,
            created_at: 3,
        });
        let counter = CounterKind::Favorites.key(2);
        fx.engine
            .cache
            .atomic(Bundle::from(CounterCache::seed_op(
                counter.clone(),
                3,
                fx.engine.config.cache.counter(CounterKind::Favorites),
            )))
            .await
            .unwrap();

        fx.engine
            .cache
            .atomic(fx.engine.rollback_bundle(&record))
            .await
            .unwrap();
        assert!(!fx.engine.cache.exists(&counter).await.unwrap());
    }

    #[test]
    fn test_recount_ops_cover_both_follow_counters() {
        let fx = fixture();
        let key = RecordKey::Follow(crate::models::FollowKey {
            follower_id: 1,
            followee_id: 2,
        });
        let dropped: Vec<String> = fx
            .engine
            .recount_ops(&key)
            .into_iter()
            .filter_map(|op| match op {
                CacheOp::Del { key } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(
            dropped,
            vec![CounterKind::Following.key(1), CounterKind::Followers.key(2)]
        );
        assert!(fx.engine.recount_ops(&RecordKey::Video(9)).is_empty());
    }

    #[tokio::test]
    async fn test_rollback_bundle_leaves_cold_counters_cold() {
        let fx = fixture();
        let record = Record::Favorite(crate::models::Favorite {
            user_id: 1,
            video_id: 2,
            created_at: 3,
        });

        fx.engine
            .cache
            .atomic(fx.engine.rollback_bundle(&record))
            .await
            .unwrap();
        assert!(!fx
            .engine
            .cache
            .exists(&CounterKind::Favorites.key(2))
            .await
            .unwrap());
    }
}
