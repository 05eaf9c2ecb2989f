//! Comments on videos.

use crate::cache::{Bundle, CounterKind, ListKind, ZItem};
use crate::error::{AppError, Result};
use crate::models::{now_millis, ActionType, Comment, CommentKey};
use crate::pagination::{item_snapshot, Page, PageCursor};
use crate::queue::Mutation;
use crate::service::{log_action, Engine};
use crate::store::{Record, RecordKey};

impl Engine {
    pub async fn comment(&self, user: u64, video_id: u64, text: &str) -> Result<Comment> {
        if self.video(video_id).await?.is_none() {
            return Err(AppError::NotFound(format!("video {video_id}")));
        }

        let comment = Comment {
            id: self.ids.next_id(),
            video_id,
            user_id: user,
            content: text.trim().to_string(),
            created_at: now_millis(),
        };
        let snapshot = serde_json::to_string(&comment)?;
        let bundle = Bundle::new()
            .with(self.list(ListKind::Comment).add_op(
                video_id,
                ZItem::new(comment.id, comment.created_at, Some(snapshot)),
            ))
            .with(self.counter_op(CounterKind::Comments, video_id, 1));

        self.apply_then_enqueue(bundle, Mutation::Insert(Record::Comment(comment.clone())))
            .await?;
        log_action("comment", ActionType::Do, user, comment.id);
        Ok(comment)
    }

    /// Deletes a comment of `video_id`. The comment list hides it until the
    /// store delete is reconciled.
    pub async fn delete_comment(&self, video_id: u64, comment_id: u64) -> Result<()> {
        if !self.has_comment(video_id, comment_id).await? {
            return Err(AppError::NotFound(format!(
                "comment {comment_id} on video {video_id}"
            )));
        }

        let bundle = Bundle::new()
            .with(self.list(ListKind::Comment).remove_op(video_id, comment_id))
            .with(self.counter_op(CounterKind::Comments, video_id, -1))
            .with(self.pending().mark_op(ListKind::Comment, video_id, comment_id));
        let key = RecordKey::Comment(CommentKey {
            video_id,
            id: comment_id,
        });

        self.apply_then_enqueue(bundle, Mutation::Delete(key)).await?;
        log_action("comment", ActionType::Undo, video_id, comment_id);
        Ok(())
    }

    /// Whether `comment_id` is a live comment on `video_id`: cached in that
    /// video's list, or stored against it and not already being deleted.
    async fn has_comment(&self, video_id: u64, comment_id: u64) -> Result<bool> {
        if self
            .list(ListKind::Comment)
            .contains(video_id, comment_id)
            .await?
        {
            return Ok(true);
        }
        if self
            .pending()
            .contains(ListKind::Comment, video_id, comment_id)
            .await?
        {
            return Ok(false);
        }
        Ok(self
            .store
            .comment(comment_id)
            .await?
            .is_some_and(|comment| comment.video_id == video_id))
    }

    /// Comments on `video_id`, newest first.
    pub async fn comment_list(&self, video_id: u64, cursor: PageCursor) -> Result<Page<Comment>> {
        let page = self
            .resolver
            .resolve(self.list(ListKind::Comment), video_id, cursor)
            .await?;
        let items = page
            .items
            .iter()
            .map(item_snapshot::<Comment>)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }
}
