//! `git`-subprocess implementation of [`ShardMiner`].
//!
//! Each project gets one bare partial clone under `clone_dir`, created or
//! refreshed once per run no matter how many of its shards run in parallel.
//! Commit hashes in the shard's window are the mined items. Every `git` child
//! is spawned with `kill_on_drop`, so a worker hitting its deadline kills the
//! process along with the future.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::domain::{MineCounts, Shard, ShardError};
use crate::miner::{ShardMiner, clean_url};
use crate::store::ItemStore;

/// Stderr fragments that mean the source itself is unusable.
const MISSING_SOURCE_MARKERS: &[&str] = &["not found", "does not exist", "could not read Username"];

type MirrorCell = Arc<OnceCell<PathBuf>>;

/// Mines commit hashes with the `git` CLI.
pub struct GitLogMiner {
    clone_dir: PathBuf,
    batch_size: usize,
    items: Arc<dyn ItemStore>,
    mirrors: Mutex<HashMap<String, MirrorCell>>,
}

impl GitLogMiner {
    pub fn new(clone_dir: impl Into<PathBuf>, batch_size: usize, items: Arc<dyn ItemStore>) -> Self {
        Self {
            clone_dir: clone_dir.into(),
            batch_size: batch_size.max(1),
            items,
            mirrors: Mutex::new(HashMap::new()),
        }
    }

    fn mirror_cell(&self, project: &str) -> Result<MirrorCell, ShardError> {
        let mut mirrors = self
            .mirrors
            .lock()
            .map_err(|e| ShardError::Other(format!("mirror table poisoned: {}", e)))?;
        Ok(mirrors.entry(project.to_string()).or_default().clone())
    }

    /// Clone on first use, fetch on the first use of this run.
    async fn ensure_mirror(&self, project: &str, url: &str) -> Result<PathBuf, ShardError> {
        let cell = self.mirror_cell(project)?;
        let path = cell
            .get_or_try_init(|| async {
                let path = self.clone_dir.join(format!("{}.git", sanitize(project)));
                if path.exists() && !is_usable_mirror(&path).await {
                    tracing::warn!(project = %project, path = %path.display(), "Removing unusable mirror");
                    tokio::fs::remove_dir_all(&path)
                        .await
                        .map_err(|e| ShardError::Other(format!("remove {}: {}", path.display(), e)))?;
                }
                if path.exists() {
                    tracing::debug!(project = %project, "Fetching existing mirror");
                    run_git(Some(&path), &["fetch", "--quiet", "--prune", "origin", "+refs/heads/*:refs/heads/*"])
                        .await?;
                } else {
                    tokio::fs::create_dir_all(&self.clone_dir)
                        .await
                        .map_err(|e| ShardError::Other(format!("create {}: {}", self.clone_dir.display(), e)))?;
                    tracing::debug!(project = %project, url = %url, "Cloning mirror");
                    let target = path.to_string_lossy().to_string();
                    run_git(None, &["clone", "--quiet", "--bare", "--filter=blob:none", url, &target]).await?;
                }
                Ok::<_, ShardError>(path)
            })
            .await?;
        Ok(path.clone())
    }

    async fn list_commits(&self, mirror: &Path, shard: &Shard) -> Result<Vec<String>, ShardError> {
        let mut args = vec!["log".to_string(), "--all".to_string(), "--format=%H".to_string()];
        if let Some(window) = &shard.window {
            // --until is inclusive; keep the window half-open
            let until = window.end - Duration::seconds(1);
            args.push(format!("--since={}", window.start.to_rfc3339()));
            args.push(format!("--until={}", until.to_rfc3339()));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = run_git(Some(mirror), &arg_refs).await?;
        Ok(stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// Run a store call on the blocking pool, off the runtime threads.
    async fn with_items<T, F>(&self, f: F) -> Result<T, ShardError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ItemStore) -> crate::error::Result<T> + Send + 'static,
    {
        let items = self.items.clone();
        tokio::task::spawn_blocking(move || f(items.as_ref()))
            .await
            .map_err(|e| ShardError::Other(format!("item store task failed: {}", e)))?
            .map_err(|e| ShardError::Other(e.to_string()))
    }
}

#[async_trait]
impl ShardMiner for GitLogMiner {
    async fn mine_shard(&self, shard: &Shard, cancel: CancellationToken) -> Result<MineCounts, ShardError> {
        let url = clean_url(&shard.source_url)
            .ok_or_else(|| ShardError::InvalidSource("Skipped: Invalid or missing URL".to_string()))?;

        let mirror = self.ensure_mirror(&shard.project, &url).await?;
        let commits = self.list_commits(&mirror, shard).await?;

        let project = shard.project.clone();
        let existing = self.with_items(move |items| items.existing_item_ids(&project)).await?;
        let (present, fresh): (Vec<String>, Vec<String>) = commits.into_iter().partition(|c| existing.contains(c));

        let mut added = 0u64;
        for batch in fresh.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(ShardError::Other("cancelled".to_string()));
            }
            let project = shard.project.clone();
            let batch = batch.to_vec();
            added += self.with_items(move |items| items.save_items(&project, &batch)).await? as u64;
        }

        Ok(MineCounts::new(added, present.len() as u64))
    }
}

/// Run `git` (optionally against a bare repo) and return stdout.
async fn run_git(git_dir: Option<&Path>, args: &[&str]) -> Result<String, ShardError> {
    let mut command = Command::new("git");
    if let Some(dir) = git_dir {
        command.arg("--git-dir").arg(dir);
    }
    command
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command
        .output()
        .await
        .map_err(|e| ShardError::Other(format!("Failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if MISSING_SOURCE_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(ShardError::InvalidSource(stderr));
        }
        return Err(ShardError::Other(format!("git {} failed: {}", args.first().unwrap_or(&""), stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether `path` is a git directory `git` can still operate on.
async fn is_usable_mirror(path: &Path) -> bool {
    run_git(Some(path), &["rev-parse", "--git-dir"]).await.is_ok()
}

/// Project name as a single safe path component.
fn sanitize(project: &str) -> String {
    project
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
