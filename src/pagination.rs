//! Paginated List Resolver
//!
//! Serves one page of a recency list. The store is queried only when the
//! cache holds nothing at all for the requested range; a short page from
//! the cache is the end of the list. Store rows fetched for a first page are
//! written back into the cache through a deferred bundle that is flushed
//! once, after the page is assembled.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::{Bundle, CacheStore, PendingDeleteSet, RecencyList, ZItem};
use crate::error::{AppError, Result};
use crate::models::now_millis;
use crate::store::{ListRow, RowBody, SourceStore};

// == Cursor ==
/// Where a page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Newest members, up to now
    Latest,
    /// Members strictly older than the given score
    Before(i64),
}

impl PageCursor {
    /// Maps the optional `cursor` query parameter.
    pub fn from_param(cursor: Option<i64>) -> Self {
        cursor.map_or(PageCursor::Latest, PageCursor::Before)
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, PageCursor::Latest)
    }

    /// Highest score the page may contain.
    pub fn max_score(&self) -> i64 {
        match self {
            PageCursor::Latest => now_millis(),
            PageCursor::Before(score) => score.saturating_sub(1),
        }
    }
}

/// One page, newest first. `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<i64>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Cache form of a store row; videos and comments travel as JSON snapshots.
pub fn row_to_item(row: ListRow) -> Result<ZItem> {
    let snapshot = match &row.body {
        RowBody::Bare => None,
        RowBody::Video(video) => Some(serde_json::to_string(video)?),
        RowBody::Comment(comment) => Some(serde_json::to_string(comment)?),
    };
    Ok(ZItem::new(row.member, row.score, snapshot))
}

/// Decodes the record embedded in a list item.
pub fn item_snapshot<T: DeserializeOwned>(item: &ZItem) -> Result<T> {
    let snapshot = item.snapshot.as_deref().ok_or_else(|| {
        AppError::Decode(format!("list member {} carries no snapshot", item.member))
    })?;
    Ok(serde_json::from_str(snapshot)?)
}

/// Rows fetched from the store for one resolver call.
struct Fetched {
    items: Vec<ZItem>,
    /// Every member scoring at least this is among `items`
    floor: i64,
}

// == Resolver ==
#[derive(Clone)]
pub struct PaginatedListResolver {
    cache: CacheStore,
    store: Arc<dyn SourceStore>,
    pending: PendingDeleteSet,
}

impl PaginatedListResolver {
    pub fn new(cache: CacheStore, store: Arc<dyn SourceStore>, pending: PendingDeleteSet) -> Self {
        Self {
            cache,
            store,
            pending,
        }
    }

    /// Resolves one page and writes any fetched rows back to the cache.
    pub async fn resolve(
        &self,
        list: &RecencyList,
        owner: u64,
        cursor: PageCursor,
    ) -> Result<Page<ZItem>> {
        let mut deferred = Bundle::new();
        let page = self.resolve_into(list, owner, cursor, &mut deferred).await?;
        self.flush(deferred).await?;
        Ok(page)
    }

    /// Submits a deferred bundle in one round trip.
    pub async fn flush(&self, deferred: Bundle) -> Result<()> {
        if !deferred.is_empty() {
            debug!(ops = deferred.len(), "Flushing deferred cache writes");
            self.cache.atomic(deferred).await?;
        }
        Ok(())
    }

    /// Resolves one page, queueing cache writes on `deferred` for the caller
    /// to flush together with its own.
    pub async fn resolve_into(
        &self,
        list: &RecencyList,
        owner: u64,
        cursor: PageCursor,
        deferred: &mut Bundle,
    ) -> Result<Page<ZItem>> {
        let page_size = list.config().page_size;
        let max_score = cursor.max_score();
        let window = list.range_by_score(owner, max_score, page_size).await?;
        let have = window.items.len();
        let remain = page_size.saturating_sub(have);

        let items = if remain == 0 {
            window.items
        } else if have == 0 {
            self.cold(list, owner, cursor, deferred).await?
        } else {
            // Short but not empty: nothing older exists.
            debug!(list = %list.kind(), owner, have, "Short page served from cache");
            window.items
        };

        let next_cursor = if items.len() < page_size {
            None
        } else {
            items.last().map(|item| item.score)
        };
        Ok(Page { items, next_cursor })
    }

    /// Store fallback for a range the cache holds nothing of. On the first
    /// page the rows are also loaded into the list.
    async fn cold(
        &self,
        list: &RecencyList,
        owner: u64,
        cursor: PageCursor,
        deferred: &mut Bundle,
    ) -> Result<Vec<ZItem>> {
        let page_size = list.config().page_size;
        let fetched = self
            .fetch(list, owner, cursor.max_score(), page_size)
            .await?;

        if cursor.is_latest() {
            deferred.push(list.fill_op(owner, fetched.items.clone(), fetched.floor));
        }
        Ok(fetched.items)
    }

    /// Up to `limit` store rows with `score <= max_score`, minus members
    /// whose deletion is still in flight.
    async fn fetch(
        &self,
        list: &RecencyList,
        owner: u64,
        max_score: i64,
        limit: usize,
    ) -> Result<Fetched> {
        let kind = list.kind();
        let masked: HashSet<u64> = if kind.masks_pending_deletes() {
            self.pending.members(kind, owner).await?.into_iter().collect()
        } else {
            HashSet::new()
        };

        let query_limit = limit + masked.len();
        let rows = self
            .store
            .range(kind, owner, max_score, query_limit)
            .await?;
        let floor = match rows.last() {
            Some(oldest) if rows.len() >= query_limit => oldest.score.saturating_add(1),
            _ => i64::MIN,
        };
        debug!(
            list = %kind,
            owner,
            max_score,
            rows = rows.len(),
            masked = masked.len(),
            "List served from store"
        );

        let items = rows
            .into_iter()
            .filter(|row| !masked.contains(&row.member))
            .take(limit)
            .map(row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(Fetched { items, floor })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Bundle, ListKind};
    use crate::config::ListConfig;
    use crate::models::Favorite;
    use crate::store::{MemoryStore, Record};
    use std::time::Duration;

    struct Fixture {
        cache: CacheStore,
        store: Arc<MemoryStore>,
        list: RecencyList,
        resolver: PaginatedListResolver,
    }

    fn fixture(capacity: usize) -> Fixture {
        let cache = CacheStore::new(8, Duration::from_millis(200));
        let store = Arc::new(MemoryStore::new());
        let pending = PendingDeleteSet::new(cache.clone(), Duration::from_secs(60));
        let list = RecencyList::new(
            cache.clone(),
            ListKind::Favorite,
            ListConfig::per_owner(capacity, 600),
        );
        let resolver = PaginatedListResolver::new(cache.clone(), store.clone(), pending);
        Fixture {
            cache,
            store,
            list,
            resolver,
        }
    }

    async fn seed_favorites(store: &MemoryStore, user: u64, scores: &[i64]) {
        for &score in scores {
            store
                .seed(Record::Favorite(Favorite {
                    user_id: user,
                    video_id: score as u64,
                    created_at: score,
                }))
                .await;
        }
    }

    fn members(items: &[ZItem]) -> Vec<u64> {
        items.iter().map(|item| item.member).collect()
    }

    #[tokio::test]
    async fn test_short_page_from_exhaustive_list_skips_store() {
        let fx = fixture(5);
        let rows = vec![ZItem::bare(3, 30), ZItem::bare(2, 20), ZItem::bare(1, 10)];
        fx.cache
            .atomic(Bundle::from(fx.list.fill_op(1, rows, i64::MIN)))
            .await
            .unwrap();

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();

        assert_eq!(members(&page.items), vec![3, 2, 1]);
        assert_eq!(page.next_cursor, None);
        assert_eq!(fx.store.queries(), 0);
    }

    #[tokio::test]
    async fn test_cold_list_served_from_store_and_cached() {
        let fx = fixture(5);
        seed_favorites(&fx.store, 1, &[1, 2, 3, 4, 5, 6, 7]).await;

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        assert_eq!(members(&page.items), vec![7, 6, 5, 4, 3]);
        assert_eq!(page.next_cursor, Some(3));

        let cached = fx.list.range_by_score(1, i64::MAX, 10).await.unwrap();
        assert_eq!(members(&cached.items), vec![7, 6, 5, 4, 3]);
        assert!(cached.is_complete());
    }

    #[tokio::test]
    async fn test_full_page_from_cache_skips_store() {
        let fx = fixture(3);
        seed_favorites(&fx.store, 1, &[1, 2, 3, 4]).await;
        fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        let queries = fx.store.queries();

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        assert_eq!(members(&page.items), vec![4, 3, 2]);
        assert_eq!(fx.store.queries(), queries);
    }

    #[tokio::test]
    async fn test_continuation_reaches_store_tail() {
        let fx = fixture(5);
        seed_favorites(&fx.store, 1, &[1, 2, 3, 4, 5, 6, 7]).await;

        let first = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        let cursor = PageCursor::from_param(first.next_cursor);
        let second = fx.resolver.resolve(&fx.list, 1, cursor).await.unwrap();

        assert_eq!(members(&second.items), vec![2, 1]);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn test_short_page_from_written_list_skips_store() {
        let fx = fixture(5);
        for member in [10, 20, 30] {
            fx.list.add(1, member, member as i64, None).await.unwrap();
        }

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();

        assert_eq!(members(&page.items), vec![30, 20, 10]);
        assert_eq!(page.next_cursor, None);
        assert_eq!(fx.store.queries(), 0);
    }

    #[tokio::test]
    async fn test_short_page_after_eviction_never_reaches_store() {
        let fx = fixture(3);
        seed_favorites(&fx.store, 1, &[1, 2, 3]).await;
        fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();

        // Member 4 evicts member 1, then 4 and 3 are removed.
        fx.list.add(1, 4, 4, None).await.unwrap();
        fx.list.remove(1, 4).await.unwrap();
        fx.list.remove(1, 3).await.unwrap();
        let queries = fx.store.queries();

        for _ in 0..5 {
            let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
            assert_eq!(members(&page.items), vec![2]);
        }
        assert_eq!(fx.store.queries(), queries);
    }

    #[tokio::test]
    async fn test_emptied_list_is_cold_again() {
        let fx = fixture(5);
        fx.list.add(1, 30, 30, None).await.unwrap();
        fx.list.remove(1, 30).await.unwrap();
        seed_favorites(&fx.store, 1, &[10, 20]).await;

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        assert_eq!(members(&page.items), vec![20, 10]);
        assert_eq!(fx.store.queries(), 1);
    }

    #[tokio::test]
    async fn test_pending_deletes_hidden_from_store_rows() {
        let fx = fixture(5);
        seed_favorites(&fx.store, 1, &[1, 2, 3]).await;
        let pending = PendingDeleteSet::new(fx.cache.clone(), Duration::from_secs(60));
        fx.cache
            .atomic(Bundle::from(pending.mark_op(ListKind::Favorite, 1, 2)))
            .await
            .unwrap();

        let page = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await.unwrap();
        assert_eq!(members(&page.items), vec![3, 1]);
    }

    #[tokio::test]
    async fn test_store_outage_fails_the_read() {
        let fx = fixture(5);
        fx.store.set_unavailable(true);

        let result = fx.resolver.resolve(&fx.list, 1, PageCursor::Latest).await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::TransientStore(_))
        ));
    }

    #[test]
    fn test_cursor_is_exclusive() {
        assert_eq!(PageCursor::from_param(None), PageCursor::Latest);
        assert_eq!(PageCursor::from_param(Some(50)).max_score(), 49);
    }
}
