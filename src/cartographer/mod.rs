//! Phase 1: The Cartographer (Pool Snapshot)
//!
//! Reads the tradeable pool set and turns it into a token multigraph.

mod fetcher;
mod graph;

pub use fetcher::{Pool, PoolFetcher, PoolSnapshot};
pub use graph::{Direction, PoolEdge, PoolGraph};
