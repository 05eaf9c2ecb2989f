//! Videos: publishing, the global feed, per-author lists and the viewer
//! decoration every video list shares.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::cache::{take, video_key, Bundle, CacheOp, CounterKind, ListKind, ZItem};
use crate::error::Result;
use crate::models::{now_millis, FavoriteKey, Video, VideoView};
use crate::pagination::{item_snapshot, Page, PageCursor};
use crate::queue::Mutation;
use crate::service::Engine;
use crate::store::{Record, RecordKey};

/// Owner id of the single global feed.
const FEED_OWNER: u64 = 0;

impl Engine {
    /// Publishes a video into the feed and the author's list. The snapshot
    /// is cached right away so the video resolves before it reaches the
    /// store.
    pub async fn publish(
        &self,
        author: u64,
        title: &str,
        play_url: &str,
        cover_url: &str,
    ) -> Result<Video> {
        let video = Video {
            id: self.ids.next_id(),
            author_id: author,
            title: title.trim().to_string(),
            play_url: play_url.to_string(),
            cover_url: cover_url.to_string(),
            created_at: now_millis(),
        };
        let snapshot = serde_json::to_string(&video)?;
        let item = ZItem::new(video.id, video.created_at, Some(snapshot.clone()));

        let bundle = Bundle::new()
            .with(self.list(ListKind::Feed).add_op(FEED_OWNER, item.clone()))
            .with(self.list(ListKind::Publish).add_op(author, item))
            .with(CacheOp::SetEx {
                key: video_key(video.id),
                value: snapshot,
                ttl: self.config.cache.video_ttl(),
            });

        self.apply_then_enqueue(bundle, Mutation::Insert(Record::Video(video.clone())))
            .await?;
        info!(video_id = video.id, author, "Video published");
        Ok(video)
    }

    /// Videos `author` published, newest first.
    pub async fn publish_list(
        &self,
        author: u64,
        cursor: PageCursor,
        viewer: Option<u64>,
    ) -> Result<Page<VideoView>> {
        self.video_page(ListKind::Publish, author, cursor, viewer)
            .await
    }

    /// The global feed, newest first.
    pub async fn feed(&self, cursor: PageCursor, viewer: Option<u64>) -> Result<Page<VideoView>> {
        self.video_page(ListKind::Feed, FEED_OWNER, cursor, viewer)
            .await
    }

    async fn video_page(
        &self,
        kind: ListKind,
        owner: u64,
        cursor: PageCursor,
        viewer: Option<u64>,
    ) -> Result<Page<VideoView>> {
        let mut deferred = Bundle::new();
        let page = self
            .resolver
            .resolve_into(self.list(kind), owner, cursor, &mut deferred)
            .await?;

        let videos = page
            .items
            .iter()
            .map(item_snapshot::<Video>)
            .collect::<Result<Vec<_>>>()?;
        let items = self.decorate(videos, viewer, &mut deferred).await?;
        self.resolver.flush(deferred).await?;

        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }

    // == Snapshots ==
    /// One video, from its cached snapshot or the store.
    pub async fn video(&self, id: u64) -> Result<Option<Video>> {
        let key = video_key(id);
        let ttl = self.config.cache.video_ttl();
        if let Some(json) = self.cache.get_and_refresh_ttl(&key, ttl).await? {
            return Ok(Some(serde_json::from_str(&json)?));
        }

        let Some(video) = self.store.video(id).await? else {
            return Ok(None);
        };
        self.cache
            .set_with_expiry(&key, serde_json::to_string(&video)?, ttl)
            .await?;
        Ok(Some(video))
    }

    /// Videos by id, in order. Snapshot misses are read from the store and
    /// cached through `deferred`; ids the store does not know are skipped.
    pub(crate) async fn videos(&self, ids: &[u64], deferred: &mut Bundle) -> Result<Vec<Video>> {
        let ttl = self.config.cache.video_ttl();
        let mut bundle = Bundle::new();
        for &id in ids {
            bundle.push(CacheOp::GetEx {
                key: video_key(id),
                ttl,
            });
        }
        let replies = self.cache.atomic(bundle).await?;

        let mut videos = Vec::with_capacity(ids.len());
        for (&id, reply) in ids.iter().zip(replies) {
            if let Some(json) = reply.into_text()? {
                videos.push(serde_json::from_str(&json)?);
                continue;
            }
            match self.store.video(id).await? {
                Some(video) => {
                    deferred.push(CacheOp::SetEx {
                        key: video_key(id),
                        value: serde_json::to_string(&video)?,
                        ttl,
                    });
                    videos.push(video);
                }
                None => warn!(video_id = id, "Listed video missing from store"),
            }
        }
        Ok(videos)
    }

    // == Decoration ==
    /// Attaches counters and the viewer's favorite flag.
    pub(crate) async fn decorate(
        &self,
        videos: Vec<Video>,
        viewer: Option<u64>,
        deferred: &mut Bundle,
    ) -> Result<Vec<VideoView>> {
        let wanted: Vec<(CounterKind, u64)> = videos
            .iter()
            .flat_map(|v| [(CounterKind::Favorites, v.id), (CounterKind::Comments, v.id)])
            .collect();
        let counts = self.counts(&wanted, deferred).await?;

        let ids: Vec<u64> = videos.iter().map(|v| v.id).collect();
        let liked = match viewer {
            Some(viewer) => self.favorites_among(viewer, &ids).await?,
            None => vec![false; ids.len()],
        };

        Ok(videos
            .into_iter()
            .zip(counts.chunks(2))
            .zip(liked)
            .map(|((video, counts), is_favorite)| VideoView {
                video,
                favorite_count: counts.first().copied().unwrap_or_default(),
                comment_count: counts.get(1).copied().unwrap_or_default(),
                is_favorite,
            })
            .collect())
    }

    /// Favorite membership of each video for `viewer`, with one cache round
    /// trip for the whole page.
    async fn favorites_among(&self, viewer: u64, ids: &[u64]) -> Result<Vec<bool>> {
        let list = self.list(ListKind::Favorite);
        let mut bundle = Bundle::new();
        for &id in ids {
            bundle.push(list.score_op(viewer, id));
        }
        let marked_at = bundle.push(self.pending().members_op(ListKind::Favorite, viewer));
        let window_at = bundle.push(list.range_op(viewer, i64::MAX, 0));
        let mut replies = self.cache.atomic(bundle).await?;

        let marked: HashSet<u64> = take(&mut replies, marked_at)?
            .into_members()?
            .into_iter()
            .collect();
        let exhaustive = take(&mut replies, window_at)?.into_window()?.is_exhaustive();

        let mut liked = Vec::with_capacity(ids.len());
        for (index, &id) in ids.iter().enumerate() {
            let cached = take(&mut replies, index)?.into_int()?.is_some();
            let member = if cached {
                true
            } else if marked.contains(&id) || exhaustive {
                false
            } else {
                let key = RecordKey::Favorite(FavoriteKey {
                    user_id: viewer,
                    video_id: id,
                });
                self.store.exists(&key).await?
            };
            liked.push(member);
        }
        Ok(liked)
    }
}

#[cfg(test)]
mod tests {
    use crate::pagination::PageCursor;
    use crate::service::tests::{fixture, video};
    use crate::store::Record;

    #[tokio::test]
    async fn test_published_video_visible_in_feed_and_author_list() {
        let fx = fixture();
        let published = fx
            .engine
            .publish(3, " first ", "https://cdn.example/a.mp4", "")
            .await
            .unwrap();
        assert_eq!(published.title, "first");

        let feed = fx.engine.feed(PageCursor::Latest, None).await.unwrap();
        assert_eq!(feed.items[0].video, published);
        let mine = fx
            .engine
            .publish_list(3, PageCursor::Latest, None)
            .await
            .unwrap();
        assert_eq!(mine.items[0].video.id, published.id);
        assert_eq!(fx.engine.video(published.id).await.unwrap(), Some(published));
    }

    #[tokio::test]
    async fn test_feed_decorates_for_viewer() {
        let fx = fixture();
        fx.store.seed(Record::Video(video(1, 9, 10))).await;
        fx.store.seed(Record::Video(video(2, 9, 20))).await;
        fx.engine.favorite(4, 1).await.unwrap();
        fx.engine.comment(4, 2, "nice").await.unwrap();

        let feed = fx.engine.feed(PageCursor::Latest, Some(4)).await.unwrap();
        let flags: Vec<(u64, bool)> = feed
            .items
            .iter()
            .map(|v| (v.video.id, v.is_favorite))
            .collect();
        assert_eq!(flags, vec![(2, false), (1, true)]);
        assert_eq!(feed.next_cursor, None);
    }

    #[tokio::test]
    async fn test_feed_pages_with_exclusive_cursor() {
        let fx = fixture();
        let page_size = fx.engine.config().cache.feed.page_size;
        for id in 1..=(page_size as u64 + 5) {
            fx.store.seed(Record::Video(video(id, 9, id as i64))).await;
        }
        fx.engine.warm_up().await.unwrap();

        let first = fx.engine.feed(PageCursor::Latest, None).await.unwrap();
        assert_eq!(first.items.len(), page_size);
        let cursor = PageCursor::from_param(first.next_cursor);
        let second = fx.engine.feed(cursor, None).await.unwrap();

        let second_ids: Vec<u64> = second.items.iter().map(|v| v.video.id).collect();
        assert_eq!(second_ids, vec![5, 4, 3, 2, 1]);
        assert_eq!(second.next_cursor, None);
    }
}
