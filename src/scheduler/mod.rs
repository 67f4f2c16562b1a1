//! Adaptive scheduler for shard mining.
//!
//! - **policy**: retry-then-split decisions for timed-out shards
//! - **worker**: the per-shard task body; owns the hard deadline
//! - **run**: the controller loop driving a bounded `JoinSet` pool
//!
//! # Architecture
//!
//! The controller keeps a local queue and a `JoinSet` of at most
//! `max_workers` tasks. It waits for any one task to finish, turns the result
//! into a tracker transition, and pushes retries and split children back into
//! the queue so the pool stays saturated. A tripped stop signal aborts the
//! pool and leaves unfinished projects un-completed.
//!
//! # Example
//!
//! ```ignore
//! use repominer::scheduler::{AdaptiveScheduler, SchedulerPolicy};
//!
//! let scheduler = AdaptiveScheduler::new(miner, SchedulerPolicy::default(), 8, stop, reporter);
//! let report = scheduler.run(shards, &mut tracker).await;
//! ```

mod policy;
mod run;
mod worker;

pub use policy::{SchedulerPolicy, TimeoutDecision};
pub use run::{AdaptiveScheduler, RunReport};
pub use worker::{WorkerContext, WorkerResult, run_shard};
