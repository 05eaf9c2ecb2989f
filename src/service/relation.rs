//! Follow graph: follow, unfollow, both directions of the list and the
//! per-user counters.

use crate::cache::{Bundle, CounterKind, ListKind, ZItem};
use crate::error::{AppError, Result};
use crate::models::{now_millis, ActionType, Follow, FollowEntry, FollowKey, UserCounts};
use crate::pagination::{Page, PageCursor};
use crate::queue::Mutation;
use crate::service::{log_action, Engine};
use crate::store::{Record, RecordKey};

fn entry(item: ZItem) -> FollowEntry {
    FollowEntry {
        user_id: item.member,
        followed_at: item.score,
    }
}

impl Engine {
    pub async fn follow(&self, follower: u64, followee: u64) -> Result<()> {
        if follower == followee {
            return Err(AppError::InvalidRequest(
                "Users cannot follow themselves".to_string(),
            ));
        }
        if self.is_following(follower, followee).await? {
            return Err(AppError::Duplicate(format!(
                "user {follower} already follows {followee}"
            )));
        }

        let follow = Follow {
            follower_id: follower,
            followee_id: followee,
            created_at: now_millis(),
        };
        let bundle = Bundle::new()
            .with(
                self.list(ListKind::Follow)
                    .insert_new_op(follower, ZItem::bare(followee, follow.created_at)),
            )
            .with(
                self.list(ListKind::Follower)
                    .add_op(followee, ZItem::bare(follower, follow.created_at)),
            )
            .with(self.counter_op(CounterKind::Following, follower, 1))
            .with(self.counter_op(CounterKind::Followers, followee, 1))
            .with(self.pending().clear_op(ListKind::Follow, follower, followee));

        self.apply_then_enqueue(bundle, Mutation::Insert(Record::Follow(follow)))
            .await?;
        log_action("follow", ActionType::Do, follower, followee);
        Ok(())
    }

    pub async fn unfollow(&self, follower: u64, followee: u64) -> Result<()> {
        if !self.is_following(follower, followee).await? {
            return Err(AppError::NotFound(format!(
                "user {follower} does not follow {followee}"
            )));
        }

        let bundle = Bundle::new()
            .with(self.list(ListKind::Follow).remove_op(follower, followee))
            .with(self.list(ListKind::Follower).remove_op(followee, follower))
            .with(self.counter_op(CounterKind::Following, follower, -1))
            .with(self.counter_op(CounterKind::Followers, followee, -1))
            .with(self.pending().mark_op(ListKind::Follow, follower, followee));
        let key = FollowKey {
            follower_id: follower,
            followee_id: followee,
        };

        self.apply_then_enqueue(bundle, Mutation::Delete(RecordKey::Follow(key)))
            .await?;
        log_action("follow", ActionType::Undo, follower, followee);
        Ok(())
    }

    /// Users `user` follows, most recent first.
    pub async fn follow_list(&self, user: u64, cursor: PageCursor) -> Result<Page<FollowEntry>> {
        let page = self
            .resolver
            .resolve(self.list(ListKind::Follow), user, cursor)
            .await?;
        Ok(page.map(entry))
    }

    /// Users following `user`, most recent first.
    pub async fn follower_list(&self, user: u64, cursor: PageCursor) -> Result<Page<FollowEntry>> {
        let page = self
            .resolver
            .resolve(self.list(ListKind::Follower), user, cursor)
            .await?;
        Ok(page.map(entry))
    }

    pub async fn is_following(&self, follower: u64, followee: u64) -> Result<bool> {
        let key = RecordKey::Follow(FollowKey {
            follower_id: follower,
            followee_id: followee,
        });
        self.is_member(ListKind::Follow, follower, followee, key)
            .await
    }

    pub async fn follow_counts(&self, user: u64) -> Result<UserCounts> {
        let mut deferred = Bundle::new();
        let counts = self
            .counts(
                &[(CounterKind::Following, user), (CounterKind::Followers, user)],
                &mut deferred,
            )
            .await?;
        self.resolver.flush(deferred).await?;

        Ok(UserCounts {
            user_id: user,
            following: counts.first().copied().unwrap_or_default(),
            followers: counts.get(1).copied().unwrap_or_default(),
        })
    }
}
