//! Background Tasks Module
//!
//! Long-lived tasks spawned at startup:
//! - TTL cleanup of expired cache keys
//! - Reconciliation workers draining the write-behind queue into the store

mod cleanup;
mod reconcile;

pub use cleanup::spawn_cleanup_task;
pub use reconcile::{spawn_reconcilers, Outcome, ReconciliationWorker};
