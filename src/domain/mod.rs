//! Domain types for repominer
//!
//! This module contains the core domain types:
//! - CandidateProject: A discovered repository, classified into a Category
//! - Shard: The unit of schedulable mining work (project + optional time window)
//! - ShardOutcome: Result of executing one shard

pub mod outcome;
pub mod project;
pub mod shard;

pub use outcome::{MineCounts, ShardError, ShardOutcome};
pub use project::{CandidateProject, Category};
pub use shard::{Shard, TimeWindow};
