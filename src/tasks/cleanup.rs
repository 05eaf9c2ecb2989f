//! TTL Cleanup Task
//!
//! Background task that periodically drops expired cache keys. Reads
//! already ignore expired keys; this bounds the memory they hold.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that removes expired keys every
/// `cleanup_interval_secs` seconds.
///
/// The returned handle can be aborted during graceful shutdown.
pub fn spawn_cleanup_task(cache: CacheStore, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                info!("TTL cleanup: removed {} expired keys", removed);
            } else {
                debug!("TTL cleanup: no expired keys found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> CacheStore {
        CacheStore::new(4, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_keys() {
        let cache = cache();
        cache
            .set_with_expiry("expire_soon", "value".into(), Duration::from_millis(200))
            .await
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.len().await, 0, "Expired key should have been cleaned up");
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_live_keys() {
        let cache = cache();
        cache
            .set_with_expiry("long_lived", "value".into(), Duration::from_secs(3600))
            .await
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("long_lived").await.unwrap().as_deref(), Some("value"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(cache(), 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
