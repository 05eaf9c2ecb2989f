//! Id generation
//!
//! Unique, roughly time-ordered 64-bit ids. The engine only depends on the
//! `IdGenerator` trait; `SnowflakeIds` is the in-process implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::now_millis;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Custom epoch, 2023-01-01T00:00:00Z.
const EPOCH_MS: i64 = 1_672_531_200_000;
const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_MASK: u64 = (1 << WORKER_BITS) - 1;

/// Snowflake layout: 41 bits of milliseconds, 10 bits of worker id, 12 bits
/// of per-millisecond sequence.
#[derive(Debug)]
pub struct SnowflakeIds {
    worker_id: u64,
    /// `(millis << SEQUENCE_BITS) | sequence` of the last id handed out
    last: AtomicU64,
}

impl SnowflakeIds {
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id) & WORKER_MASK,
            last: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SnowflakeIds {
    fn next_id(&self) -> u64 {
        loop {
            let now = (now_millis() - EPOCH_MS).max(0) as u64;
            let prev = self.last.load(Ordering::SeqCst);
            let (prev_ms, prev_seq) = (prev >> SEQUENCE_BITS, prev & SEQUENCE_MASK);

            // A stalled or backwards clock keeps counting on the last millisecond.
            let (ms, seq) = if now > prev_ms {
                (now, 0)
            } else if prev_seq < SEQUENCE_MASK {
                (prev_ms, prev_seq + 1)
            } else {
                (prev_ms + 1, 0)
            };

            let next = (ms << SEQUENCE_BITS) | seq;
            if self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return (ms << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | seq;
            }
        }
    }
}
