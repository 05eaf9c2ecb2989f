//! Partitioned Log Module
//!
//! Append-only in-process log. Records are routed to a partition by their
//! affinity key, so records sharing a key are consumed in append order.
//! A record stays in its partition until the consumer commits its offset;
//! polling again before the commit returns the same record.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use crate::queue::QueueError;

/// One appended record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub partition: usize,
    pub offset: u64,
    pub affinity_key: String,
    pub value: Vec<u8>,
}

/// A record parked for manual replay.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub partition: usize,
    pub offset: u64,
    pub affinity_key: String,
    pub value: String,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PartitionState {
    uncommitted: VecDeque<LogRecord>,
    next_offset: u64,
}

#[derive(Debug, Default)]
struct Partition {
    state: Mutex<PartitionState>,
    ready: Notify,
}

// == Durable Log ==
#[derive(Debug)]
pub struct DurableLog {
    partitions: Vec<Partition>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    closed: AtomicBool,
}

impl DurableLog {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions.max(1)).map(|_| Partition::default()).collect(),
            dead_letters: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Partition owning `affinity_key`.
    pub fn partition_for(&self, affinity_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        affinity_key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    // == Produce ==
    /// Appends a record and returns its partition and offset.
    pub async fn append(&self, affinity_key: &str, value: Vec<u8>) -> Result<(usize, u64), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let partition = self.partition_for(affinity_key);
        let slot = &self.partitions[partition];

        let mut state = slot.state.lock().await;
        let offset = state.next_offset;
        state.next_offset += 1;
        state.uncommitted.push_back(LogRecord {
            partition,
            offset,
            affinity_key: affinity_key.to_string(),
            value,
        });
        drop(state);

        slot.ready.notify_one();
        Ok((partition, offset))
    }

    // == Consume ==
    /// Waits for the oldest uncommitted record of `partition`.
    ///
    /// Returns `None` once the log is closed and the partition is drained.
    pub async fn poll(&self, partition: usize) -> Option<LogRecord> {
        let slot = self.partitions.get(partition)?;
        loop {
            {
                let state = slot.state.lock().await;
                if let Some(record) = state.uncommitted.front() {
                    return Some(record.clone());
                }
            }
            if self.is_closed() {
                return None;
            }
            slot.ready.notified().await;
        }
    }

    /// Marks every record of `partition` up to `offset` as processed.
    pub async fn commit(&self, partition: usize, offset: u64) {
        let Some(slot) = self.partitions.get(partition) else {
            return;
        };
        let mut state = slot.state.lock().await;
        while state
            .uncommitted
            .front()
            .is_some_and(|record| record.offset <= offset)
        {
            state.uncommitted.pop_front();
        }
    }

    /// Uncommitted records across all partitions.
    pub async fn lag(&self) -> usize {
        let mut total = 0;
        for slot in &self.partitions {
            total += slot.state.lock().await.uncommitted.len();
        }
        total
    }

    // == Dead Letters ==
    pub async fn park(&self, record: &LogRecord, reason: impl Into<String>, attempts: u32) {
        self.dead_letters.lock().await.push(DeadLetter {
            partition: record.partition,
            offset: record.offset,
            affinity_key: record.affinity_key.clone(),
            value: String::from_utf8_lossy(&record.value).into_owned(),
            reason: reason.into(),
            attempts,
            failed_at: Utc::now(),
        });
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    // == Shutdown ==
    /// Rejects further appends and wakes idle consumers so they can drain
    /// and exit.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for slot in &self.partitions {
            slot.ready.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
