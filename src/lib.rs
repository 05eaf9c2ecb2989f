//! clipcache - cache core of a short-video social backend
//!
//! Bounded recency lists, promotable counters and atomic cache bundles in
//! front of a relational store. Writes land in the cache first and reach
//! the store through a durable write-behind queue; paginated reads merge the
//! cache with the store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod pagination;
pub mod queue;
pub mod service;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use service::Engine;
pub use tasks::{spawn_cleanup_task, spawn_reconcilers};
