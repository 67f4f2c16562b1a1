//! The unit of work: mining one shard of a repository's history.
//!
//! The scheduler only depends on the [`ShardMiner`] trait. [`GitLogMiner`]
//! is the production implementation; tests script their own.

mod git;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{MineCounts, Shard, ShardError};

pub use git::GitLogMiner;

/// Mines the items (commits) of one shard.
///
/// Implementations must tolerate being dropped mid-flight: the worker enforces
/// its deadline by dropping the future. `cancel` is tripped on deadline expiry
/// and on run stop, for implementations that can check it between steps.
#[async_trait]
pub trait ShardMiner: Send + Sync {
    async fn mine_shard(&self, shard: &Shard, cancel: CancellationToken) -> Result<MineCounts, ShardError>;
}

/// Normalize a source location: trim, drop trailing slashes, and rewrite
/// `github.com:owner/repo` into `github.com/owner/repo`.
pub fn clean_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return None;
    }
    if url.contains("github.com:") && !url.contains("github.com:443") {
        return Some(url.replacen("github.com:", "github.com/", 1));
    }
    Some(url.to_string())
}
