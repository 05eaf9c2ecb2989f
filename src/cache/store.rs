//! Cache Store Module
//!
//! Shared handle to the keyspace. Every call takes a pooled handle and runs
//! as one bundle, so multi-step updates are never observed half-applied.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::cache::{Bundle, CacheOp, CacheStats, KeyTtl, Keyspace, OpResult, Pool};
use crate::config::CacheConfig;
use crate::error::{AppError, Result};

#[derive(Debug)]
struct Inner {
    keyspace: RwLock<Keyspace>,
    pool: Pool,
}

// == Cache Store ==
/// Cheaply cloneable cache client.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store whose callers share `pool_size` handles and wait at
    /// most `acquire_timeout` for one.
    pub fn new(pool_size: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                keyspace: RwLock::new(Keyspace::new()),
                pool: Pool::new(pool_size, acquire_timeout),
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.pool_size, config.acquire_timeout())
    }

    // == Atomic ==
    /// Applies `bundle` as one indivisible unit and returns one reply per
    /// operation, in order.
    pub async fn atomic(&self, bundle: Bundle) -> Result<Vec<OpResult>> {
        if bundle.is_empty() {
            return Ok(Vec::new());
        }
        let _handle = self.inner.pool.acquire().await?;
        let mut keyspace = self.inner.keyspace.write().await;
        keyspace.apply(bundle.into_ops())
    }

    async fn single(&self, op: CacheOp) -> Result<OpResult> {
        self.atomic(Bundle::from(op))
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("empty bundle reply".to_string()))
    }

    // == Primitive Contract ==
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.single(CacheOp::Get {
            key: key.to_string(),
        })
        .await?
        .into_text()
    }

    /// Reads `key` and restarts its TTL at `ttl`.
    pub async fn get_and_refresh_ttl(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        self.single(CacheOp::GetEx {
            key: key.to_string(),
            ttl,
        })
        .await?
        .into_text()
    }

    pub async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.single(CacheOp::SetEx {
            key: key.to_string(),
            value,
            ttl,
        })
        .await
        .map(|_| ())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.single(CacheOp::Exists {
            key: key.to_string(),
        })
        .await?
        .into_bool()
    }

    // == Inspection ==
    /// Remaining lifetime of `key`.
    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let _handle = self.inner.pool.acquire().await?;
        Ok(self.inner.keyspace.write().await.ttl(key))
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.keyspace.read().await.stats()
    }

    /// Drops every expired key; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.inner.keyspace.write().await.cleanup_expired()
    }

    pub async fn len(&self) -> usize {
        self.inner.keyspace.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.keyspace.read().await.is_empty()
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }
}
