//! Pending Delete Module
//!
//! Per-owner markers for cancellations that reached the cache but not yet
//! the store. A marked member reads as absent even when a store fallback
//! still returns it.

use std::time::Duration;

use crate::cache::{take, Bundle, CacheOp, CacheStore, ListKind};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PendingDeleteSet {
    store: CacheStore,
    ttl: Duration,
}

impl PendingDeleteSet {
    pub fn new(store: CacheStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn mark_op(&self, kind: ListKind, owner: u64, member: u64) -> CacheOp {
        CacheOp::SAdd {
            key: kind.pending_key(owner),
            member,
            ttl: self.ttl,
        }
    }

    pub fn clear_op(&self, kind: ListKind, owner: u64, member: u64) -> CacheOp {
        CacheOp::SRem {
            key: kind.pending_key(owner),
            member,
        }
    }

    pub fn contains_op(&self, kind: ListKind, owner: u64, member: u64) -> CacheOp {
        CacheOp::SIsMember {
            key: kind.pending_key(owner),
            member,
        }
    }

    pub fn members_op(&self, kind: ListKind, owner: u64) -> CacheOp {
        CacheOp::SMembers {
            key: kind.pending_key(owner),
        }
    }

    /// Drops the marker; returns whether one was present.
    pub async fn clear(&self, kind: ListKind, owner: u64, member: u64) -> Result<bool> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.clear_op(kind, owner, member)))
            .await?;
        take(&mut replies, 0)?.into_bool()
    }

    pub async fn contains(&self, kind: ListKind, owner: u64, member: u64) -> Result<bool> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.contains_op(kind, owner, member)))
            .await?;
        take(&mut replies, 0)?.into_bool()
    }

    pub async fn members(&self, kind: ListKind, owner: u64) -> Result<Vec<u64>> {
        let mut replies = self
            .store
            .atomic(Bundle::from(self.members_op(kind, owner)))
            .await?;
        take(&mut replies, 0)?.into_members()
    }
}
