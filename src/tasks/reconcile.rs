//! Reconciliation Workers
//!
//! One long-lived task per queue partition applies queued mutations to the
//! store, in order, and commits each record only once it is settled:
//! applied, resolved as a conflict, or parked as a dead letter. Settling a
//! mutation drops the counters it adjusted so they are recounted.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::Bundle;
use crate::error::Result;
use crate::queue::{LogRecord, Mutation};
use crate::service::Engine;
use crate::store::{Record, RecordKey, StoreError};

/// How a mutation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Insert conflicted with a row that is already there
    AlreadyPresent,
    /// Insert conflicted and the row is absent; the cache was rolled back
    RolledBack,
    /// Delete found nothing to delete
    AlreadyGone,
    /// Record could not be applied and was parked
    DeadLettered,
}

// == Reconciliation Worker ==
pub struct ReconciliationWorker {
    engine: Arc<Engine>,
    partition: usize,
    max_attempts: u32,
    backoff: Duration,
}

impl ReconciliationWorker {
    pub fn new(engine: Arc<Engine>, partition: usize) -> Self {
        let queue = &engine.config().queue;
        let (max_attempts, backoff) = (queue.max_attempts, Duration::from_millis(queue.backoff_ms));
        Self {
            engine,
            partition,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Consumes the partition until the queue is closed and drained.
    pub async fn run(self) {
        let log = self.engine.queue().log().clone();
        info!(partition = self.partition, "Reconciler started");

        while let Some(record) = log.poll(self.partition).await {
            self.process(&record).await;
            log.commit(self.partition, record.offset).await;
        }

        info!(partition = self.partition, "Reconciler stopped");
    }

    /// Settles one record. Transient failures are retried with a linear
    /// backoff; a record that keeps failing is parked.
    pub async fn process(&self, record: &LogRecord) -> Outcome {
        let log = self.engine.queue().log();
        let mutation = match Mutation::decode(&record.value) {
            Ok(mutation) => mutation,
            Err(err) => {
                error!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "Undecodable mutation parked"
                );
                log.park(record, err.to_string(), 0).await;
                return Outcome::DeadLettered;
            }
        };

        let mut marker_cleared = false;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.apply(&mutation, &mut marker_cleared).await {
                Ok(outcome) => {
                    debug!(
                        affinity_key = %record.affinity_key,
                        offset = record.offset,
                        ?outcome,
                        attempt,
                        "Mutation reconciled"
                    );
                    return outcome;
                }
                Err(err) if attempt < self.max_attempts => {
                    warn!(
                        affinity_key = %record.affinity_key,
                        attempt,
                        error = %err,
                        "Reconciliation failed; retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => {
                    error!(
                        affinity_key = %record.affinity_key,
                        offset = record.offset,
                        attempts = attempt,
                        error = %err,
                        "Reconciliation gave up; mutation parked"
                    );
                    log.park(record, err.to_string(), attempt).await;
                    return Outcome::DeadLettered;
                }
            }
        }
    }

    async fn apply(&self, mutation: &Mutation, marker_cleared: &mut bool) -> Result<Outcome> {
        match mutation {
            Mutation::Insert(record) => self.insert(record).await,
            Mutation::Delete(key) => self.delete(key, marker_cleared).await,
        }
    }

    async fn insert(&self, record: &Record) -> Result<Outcome> {
        let store = self.engine.store();
        let key = record.key();
        match store.insert(record).await {
            Ok(()) => {
                self.recount(&key).await?;
                Ok(Outcome::Applied)
            }
            Err(StoreError::Conflict { constraint }) => {
                if store.exists(&key).await? {
                    debug!(%key, %constraint, "Row already present");
                    self.recount(&key).await?;
                    return Ok(Outcome::AlreadyPresent);
                }
                warn!(%key, %constraint, "Insert lost a race with a delete; rolling back cache");
                self.engine
                    .cache()
                    .atomic(self.engine.rollback_bundle(record))
                    .await?;
                Ok(Outcome::RolledBack)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes the row. The pending-delete marker is dropped after the
    /// first store attempt whatever its result.
    async fn delete(&self, key: &RecordKey, marker_cleared: &mut bool) -> Result<Outcome> {
        let result = self.engine.store().delete(key).await;

        if !*marker_cleared {
            if let Some(op) = self.engine.pending_marker(key) {
                self.engine.cache().atomic(Bundle::from(op)).await?;
            }
            *marker_cleared = true;
        }

        let outcome = match result {
            Ok(()) => Outcome::Applied,
            Err(StoreError::NotFound) => Outcome::AlreadyGone,
            Err(err) => return Err(err.into()),
        };
        self.recount(key).await?;
        Ok(outcome)
    }

    async fn recount(&self, key: &RecordKey) -> Result<()> {
        let bundle = self
            .engine
            .recount_ops(key)
            .into_iter()
            .fold(Bundle::new(), Bundle::with);
        if !bundle.is_empty() {
            self.engine.cache().atomic(bundle).await?;
        }
        Ok(())
    }
}

/// Spawns one worker per queue partition.
pub fn spawn_reconcilers(engine: Arc<Engine>) -> Vec<JoinHandle<()>> {
    let partitions = engine.queue().log().partitions();
    info!(partitions, "Starting reconciliation workers");
    (0..partitions)
        .map(|partition| tokio::spawn(ReconciliationWorker::new(engine.clone(), partition).run()))
        .collect()
}
