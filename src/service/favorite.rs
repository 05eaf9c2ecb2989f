//! Favorites: like, unlike, the per-user favorite list and membership.

use crate::cache::{Bundle, CounterKind, ListKind, ZItem};
use crate::error::{AppError, Result};
use crate::models::{now_millis, ActionType, Favorite, FavoriteKey, VideoView};
use crate::pagination::{Page, PageCursor};
use crate::queue::Mutation;
use crate::service::{log_action, Engine};
use crate::store::{Record, RecordKey};

impl Engine {
    pub async fn favorite(&self, user: u64, video_id: u64) -> Result<()> {
        if self.video(video_id).await?.is_none() {
            return Err(AppError::NotFound(format!("video {video_id}")));
        }
        if self.is_favorite(user, video_id).await? {
            return Err(AppError::Duplicate(format!(
                "user {user} already favorited video {video_id}"
            )));
        }

        let favorite = Favorite {
            user_id: user,
            video_id,
            created_at: now_millis(),
        };
        let bundle = Bundle::new()
            .with(
                self.list(ListKind::Favorite)
                    .insert_new_op(user, ZItem::bare(video_id, favorite.created_at)),
            )
            .with(self.counter_op(CounterKind::Favorites, video_id, 1))
            .with(self.pending().clear_op(ListKind::Favorite, user, video_id));

        self.apply_then_enqueue(bundle, Mutation::Insert(Record::Favorite(favorite)))
            .await?;
        log_action("favorite", ActionType::Do, user, video_id);
        Ok(())
    }

    /// Removes the favorite from the list, decrements the video's counter and
    /// marks the pending delete, all in one bundle.
    pub async fn unfavorite(&self, user: u64, video_id: u64) -> Result<()> {
        if !self.is_favorite(user, video_id).await? {
            return Err(AppError::NotFound(format!(
                "user {user} has not favorited video {video_id}"
            )));
        }

        let bundle = Bundle::new()
            .with(self.list(ListKind::Favorite).remove_op(user, video_id))
            .with(self.counter_op(CounterKind::Favorites, video_id, -1))
            .with(self.pending().mark_op(ListKind::Favorite, user, video_id));
        let key = FavoriteKey {
            user_id: user,
            video_id,
        };

        self.apply_then_enqueue(bundle, Mutation::Delete(RecordKey::Favorite(key)))
            .await?;
        log_action("favorite", ActionType::Undo, user, video_id);
        Ok(())
    }

    /// Videos `user` favorited, most recent first, decorated for `viewer`.
    pub async fn favorite_list(
        &self,
        user: u64,
        cursor: PageCursor,
        viewer: Option<u64>,
    ) -> Result<Page<VideoView>> {
        let mut deferred = Bundle::new();
        let page = self
            .resolver
            .resolve_into(self.list(ListKind::Favorite), user, cursor, &mut deferred)
            .await?;

        let ids: Vec<u64> = page.items.iter().map(|item| item.member).collect();
        let videos = self.videos(&ids, &mut deferred).await?;
        let items = self.decorate(videos, viewer, &mut deferred).await?;
        self.resolver.flush(deferred).await?;

        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }

    pub async fn is_favorite(&self, user: u64, video_id: u64) -> Result<bool> {
        let key = RecordKey::Favorite(FavoriteKey {
            user_id: user,
            video_id,
        });
        self.is_member(ListKind::Favorite, user, video_id, key)
            .await
    }
}
