//! Repominer - adaptive, resumable repository history mining
//!
//! Discovers candidate repositories on a rate-limited hosting API, samples
//! them against a per-category quota, partitions large histories into
//! time-window shards, and mines them on a bounded worker pool that retries
//! and recursively splits shards that time out.

pub mod config;
pub mod coordination;
pub mod crawler;
pub mod domain;
pub mod error;
pub mod miner;
pub mod planner;
pub mod reporter;
pub mod runner;
pub mod sampler;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use error::{MinerError, Result};
