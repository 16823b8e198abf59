//! Replication targets
//!
//! Decides how many peers should hold each shard and which shards are
//! still short.

mod priority;
mod tracker;

pub use priority::{Priority, ReplicationTargets};
pub use tracker::{ReplicationEntry, ReplicationError, ReplicationTracker};
