//! Persistence for discovered candidates, completion markers and mined items.
//!
//! The scheduler only sees the two narrow traits defined here:
//! - **CompletionStore**: the append-only set of fully mined projects
//! - **ItemStore**: item ids already stored per project, used to skip duplicates
//!
//! `MinerStore` implements both on SQLite; `MemoryStore` is an in-process
//! implementation for tests and dry runs.
//!
//! # Example
//!
//! ```ignore
//! use repominer::store::{CompletionStore, MinerStore};
//!
//! let store = MinerStore::open_at(Path::new("/tmp/repominer"))?;
//! store.mark_project_completed("kafka")?;
//! assert!(store.completed_project_names()?.contains("kafka"));
//! ```

mod memory;
mod miner_store;

use std::collections::HashSet;

use crate::error::Result;

pub use memory::MemoryStore;
pub use miner_store::MinerStore;

/// Durable record of projects whose every shard succeeded.
pub trait CompletionStore: Send + Sync {
    /// Names of all projects ever marked completed.
    fn completed_project_names(&self) -> Result<HashSet<String>>;

    /// Mark `name` completed. Returns `false` if it already was.
    fn mark_project_completed(&self, name: &str) -> Result<bool>;
}

/// Mined item ids per project.
pub trait ItemStore: Send + Sync {
    fn existing_item_ids(&self, project: &str) -> Result<HashSet<String>>;

    /// Store `ids` for `project`, ignoring ones already present. Returns how
    /// many were new.
    fn save_items(&self, project: &str, ids: &[String]) -> Result<usize>;
}
