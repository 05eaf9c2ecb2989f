//! Write-behind queue
//!
//! Durable, at-least-once channel carrying store mutations from request
//! handlers to the reconciliation workers.

mod log;
mod mutation;

pub use log::{DeadLetter, DurableLog, LogRecord};
pub use mutation::{Mutation, Op};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
    #[error("cannot encode mutation: {0}")]
    Encode(String),
    #[error("cannot decode mutation: {0}")]
    Decode(String),
}

// == Write-Behind Queue ==
/// Producer handle shared by request handlers.
#[derive(Debug, Clone)]
pub struct WriteBehindQueue {
    log: Arc<DurableLog>,
}

impl WriteBehindQueue {
    pub fn new(log: Arc<DurableLog>) -> Self {
        Self { log }
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self::new(Arc::new(DurableLog::new(partitions)))
    }

    /// Durably queues `mutation` under its affinity key.
    ///
    /// Callers have already applied the matching cache change; a failure
    /// here leaves that change in place without a queued store write.
    pub async fn enqueue(&self, mutation: &Mutation) -> Result<(), QueueError> {
        let affinity_key = mutation.affinity_key();
        let value = mutation.encode()?;
        match self.log.append(&affinity_key, value).await {
            Ok((partition, offset)) => {
                debug!(
                    affinity_key = %affinity_key,
                    partition,
                    offset,
                    op = ?mutation.op(),
                    "Mutation queued"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    affinity_key = %affinity_key,
                    error = %err,
                    "Mutation not queued; cache already reflects it"
                );
                Err(err)
            }
        }
    }

    pub fn log(&self) -> &Arc<DurableLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Favorite;
    use crate::store::Record;

    fn favorite() -> Mutation {
        Mutation::Insert(Record::Favorite(Favorite {
            user_id: 1,
            video_id: 2,
            created_at: 5,
        }))
    }

    #[tokio::test]
    async fn test_enqueue_lands_in_affinity_partition() {
        let queue = WriteBehindQueue::with_partitions(4);
        let mutation = favorite();
        queue.enqueue(&mutation).await.unwrap();

        let partition = queue.log().partition_for(&mutation.affinity_key());
        let record = queue.log().poll(partition).await.unwrap();
        assert_eq!(Mutation::decode(&record.value).unwrap(), mutation);
    }

    #[tokio::test]
    async fn test_enqueue_on_closed_queue_fails() {
        let queue = WriteBehindQueue::with_partitions(1);
        queue.log().close();
        assert_eq!(queue.enqueue(&favorite()).await, Err(QueueError::Closed));
    }
}
