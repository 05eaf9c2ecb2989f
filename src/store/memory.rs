//! In-process store
//!
//! Table-per-entity store with the same uniqueness rules as the relational
//! schema. Used when no database is configured, and by tests, which can
//! inject faults and count queries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{CounterKind, ListKind};
use crate::models::{Comment, Favorite, FavoriteKey, Follow, FollowKey, Video};
use crate::store::{ListRow, Record, RecordKey, SourceStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    videos: BTreeMap<u64, Video>,
    favorites: HashMap<FavoriteKey, Favorite>,
    follows: HashMap<FollowKey, Follow>,
    comments: BTreeMap<u64, Comment>,
}

// == Memory Store ==
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    queries: AtomicU64,
    unavailable: AtomicBool,
    phantom_conflicts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls served so far, reads and writes alike.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Makes every call fail with `Unavailable` until switched off.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Makes inserts report a uniqueness conflict without writing the row,
    /// as when a concurrent delete wins the race.
    pub fn set_phantom_conflicts(&self, on: bool) {
        self.phantom_conflicts.store(on, Ordering::SeqCst);
    }

    /// Writes a row directly, bypassing the query counter and faults.
    /// Seeding a row that is already present is a test bug.
    pub async fn seed(&self, record: Record) {
        let seeded = self.tables.write().await.insert(record);
        debug_assert!(seeded.is_ok(), "seeded a duplicate row: {seeded:?}");
    }

    fn begin(&self) -> StoreResult<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

fn conflict(constraint: &str) -> StoreError {
    StoreError::Conflict {
        constraint: constraint.to_string(),
    }
}

impl Tables {
    fn insert(&mut self, record: Record) -> StoreResult<()> {
        match record {
            Record::Favorite(f) => {
                if self.favorites.contains_key(&f.key()) {
                    return Err(conflict("favorites_user_video_key"));
                }
                self.favorites.insert(f.key(), f);
            }
            Record::Follow(f) => {
                if self.follows.contains_key(&f.key()) {
                    return Err(conflict("follows_follower_followee_key"));
                }
                self.follows.insert(f.key(), f);
            }
            Record::Comment(c) => {
                if self.comments.contains_key(&c.id) {
                    return Err(conflict("comments_pkey"));
                }
                self.comments.insert(c.id, c);
            }
            Record::Video(v) => {
                if self.videos.contains_key(&v.id) {
                    return Err(conflict("videos_pkey"));
                }
                self.videos.insert(v.id, v);
            }
        }
        Ok(())
    }

    fn remove(&mut self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Favorite(k) => self.favorites.remove(k).is_some(),
            RecordKey::Follow(k) => self.follows.remove(k).is_some(),
            RecordKey::Comment(k) => {
                if !self.contains(key) {
                    return false;
                }
                self.comments.remove(&k.id).is_some()
            }
            RecordKey::Video(id) => self.videos.remove(id).is_some(),
        }
    }

    fn contains(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Favorite(k) => self.favorites.contains_key(k),
            RecordKey::Follow(k) => self.follows.contains_key(k),
            RecordKey::Comment(k) => self
                .comments
                .get(&k.id)
                .is_some_and(|c| c.video_id == k.video_id),
            RecordKey::Video(id) => self.videos.contains_key(id),
        }
    }

    fn rows(&self, list: ListKind, owner: u64) -> Vec<ListRow> {
        match list {
            ListKind::Follow => self
                .follows
                .values()
                .filter(|f| f.follower_id == owner)
                .map(|f| ListRow::bare(f.followee_id, f.created_at))
                .collect(),
            ListKind::Follower => self
                .follows
                .values()
                .filter(|f| f.followee_id == owner)
                .map(|f| ListRow::bare(f.follower_id, f.created_at))
                .collect(),
            ListKind::Favorite => self
                .favorites
                .values()
                .filter(|f| f.user_id == owner)
                .map(|f| ListRow::bare(f.video_id, f.created_at))
                .collect(),
            ListKind::Publish => self
                .videos
                .values()
                .filter(|v| v.author_id == owner)
                .cloned()
                .map(ListRow::video)
                .collect(),
            ListKind::Feed => self.videos.values().cloned().map(ListRow::video).collect(),
            ListKind::Comment => self
                .comments
                .values()
                .filter(|c| c.video_id == owner)
                .cloned()
                .map(ListRow::comment)
                .collect(),
        }
    }

    fn count(&self, counter: CounterKind, owner: u64) -> usize {
        match counter {
            CounterKind::Following => self.follows.values().filter(|f| f.follower_id == owner).count(),
            CounterKind::Followers => self.follows.values().filter(|f| f.followee_id == owner).count(),
            CounterKind::Favorites => self.favorites.values().filter(|f| f.video_id == owner).count(),
            CounterKind::Comments => self.comments.values().filter(|c| c.video_id == owner).count(),
        }
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn insert(&self, record: &Record) -> StoreResult<()> {
        self.begin()?;
        if self.phantom_conflicts.load(Ordering::SeqCst) {
            return Err(conflict("phantom"));
        }
        self.tables.write().await.insert(record.clone())
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        self.begin()?;
        if self.tables.write().await.remove(key) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn exists(&self, key: &RecordKey) -> StoreResult<bool> {
        self.begin()?;
        Ok(self.tables.read().await.contains(key))
    }

    async fn range(
        &self,
        list: ListKind,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<ListRow>> {
        self.begin()?;
        let mut rows: Vec<ListRow> = self
            .tables
            .read()
            .await
            .rows(list, owner)
            .into_iter()
            .filter(|row| row.score <= max_score)
            .collect();
        rows.sort_by(|a, b| (b.score, b.member).cmp(&(a.score, a.member)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self, counter: CounterKind, owner: u64) -> StoreResult<i64> {
        self.begin()?;
        Ok(self.tables.read().await.count(counter, owner) as i64)
    }

    async fn video(&self, id: u64) -> StoreResult<Option<Video>> {
        self.begin()?;
        Ok(self.tables.read().await.videos.get(&id).cloned())
    }

    async fn comment(&self, id: u64) -> StoreResult<Option<Comment>> {
        self.begin()?;
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favorite(user_id: u64, video_id: u64, created_at: i64) -> Record {
        Record::Favorite(Favorite {
            user_id,
            video_id,
            created_at,
        })
    }

    #[tokio::test]
    async fn test_insert_enforces_pair_uniqueness() {
        let store = MemoryStore::new();
        store.insert(&favorite(1, 2, 10)).await.unwrap();

        let err = store.insert(&favorite(1, 2, 20)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.count(CounterKind::Favorites, 2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let key = favorite(1, 2, 10).key();
        assert_eq!(store.delete(&key).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_range_newest_first_bounded_by_score() {
        let store = MemoryStore::new();
        for (video, at) in [(1, 10), (2, 30), (3, 20), (4, 40)] {
            store.seed(favorite(7, video, at)).await;
        }

        let rows = store.range(ListKind::Favorite, 7, 30, 2).await.unwrap();
        let scores: Vec<i64> = rows.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![30, 20]);
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test]
    #[should_panic(expected = "seeded a duplicate row")]
    async fn test_seeding_duplicate_row_panics() {
        let store = MemoryStore::new();
        store.seed(favorite(1, 2, 10)).await;
        store.seed(favorite(1, 2, 20)).await;
    }

    #[tokio::test]
    async fn test_comment_lookup_by_id() {
        let store = MemoryStore::new();
        store
            .seed(Record::Comment(Comment {
                id: 77,
                video_id: 6,
                user_id: 1,
                content: "hi".into(),
                created_at: 10,
            }))
            .await;

        assert_eq!(store.comment(77).await.unwrap().map(|c| c.video_id), Some(6));
        assert_eq!(store.comment(78).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_faults() {
        let store = MemoryStore::new();

        store.set_phantom_conflicts(true);
        let record = favorite(1, 2, 10);
        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::Conflict { .. })
        ));
        store.set_phantom_conflicts(false);
        assert!(!store.exists(&record.key()).await.unwrap());

        store.set_unavailable(true);
        assert!(matches!(
            store.exists(&record.key()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
