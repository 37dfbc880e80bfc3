//! Cluster-side consumption of the store-view contract: region-routed
//! dispatch over a set of shards, and the replica backfill runner.

pub mod dispatcher;
pub mod runner;

pub use dispatcher::ShardedDispatcher;
pub use runner::{run_backfill, BackfillStats};
