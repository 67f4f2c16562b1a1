//! Completion bookkeeping, owned by the scheduler's controller loop.
//!
//! Nothing here is shared with workers, so there are no locks: the controller
//! is the only writer. A project is persisted as completed exactly when its
//! outstanding shard count reaches zero and none of its shards failed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::Shard;
use crate::error::Result;
use crate::store::CompletionStore;

/// Terminal state of a project within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Completed,
    FinishedWithErrors,
}

#[derive(Debug, Default)]
struct ProjectProgress {
    remaining: usize,
    has_error: bool,
    status: Option<ProjectStatus>,
}

/// End-of-run view of every registered project, names sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSummary {
    pub completed: Vec<String>,
    pub with_errors: Vec<String>,
    /// Shards still outstanding (stopped run)
    pub unfinished: Vec<String>,
}

pub struct CompletionTracker {
    projects: BTreeMap<String, ProjectProgress>,
    retry_counts: HashMap<Shard, u32>,
    store: Arc<dyn CompletionStore>,
}

impl CompletionTracker {
    pub fn new(store: Arc<dyn CompletionStore>) -> Self {
        Self {
            projects: BTreeMap::new(),
            retry_counts: HashMap::new(),
            store,
        }
    }

    /// Count the initially planned shards.
    pub fn register(&mut self, shards: &[Shard]) {
        for shard in shards {
            self.projects.entry(shard.project.clone()).or_default().remaining += 1;
        }
    }

    pub fn retries(&self, shard: &Shard) -> u32 {
        self.retry_counts.get(shard).copied().unwrap_or(0)
    }

    /// Count one more timeout for `shard` and return the new total.
    pub fn record_timeout(&mut self, shard: &Shard) -> u32 {
        let count = self.retry_counts.entry(shard.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Replace `parent` by `children`: the parent's pending decrement and the
    /// children's increments are applied as one `+ (children - 1)`.
    pub fn record_split(&mut self, parent: &Shard, children: &[Shard]) {
        self.retry_counts.remove(parent);
        let progress = self.projects.entry(parent.project.clone()).or_default();
        progress.remaining = (progress.remaining + children.len()).saturating_sub(1);
    }

    /// Record a shard reaching a terminal outcome.
    ///
    /// Returns the project's status if this was its last outstanding shard.
    /// Completion is persisted before returning; if that write fails the
    /// project is left as finished with errors and the error is returned.
    pub fn record_terminal(&mut self, shard: &Shard, failed: bool) -> Result<Option<ProjectStatus>> {
        self.retry_counts.remove(shard);
        let progress = self.projects.entry(shard.project.clone()).or_default();
        if failed {
            progress.has_error = true;
        }
        progress.remaining = progress.remaining.saturating_sub(1);

        if progress.remaining > 0 || progress.status.is_some() {
            return Ok(None);
        }

        if progress.has_error {
            progress.status = Some(ProjectStatus::FinishedWithErrors);
            return Ok(Some(ProjectStatus::FinishedWithErrors));
        }

        // The project only counts as completed once the marker is stored
        match self.store.mark_project_completed(&shard.project) {
            Ok(newly_marked) => {
                if !newly_marked {
                    tracing::debug!(project = %shard.project, "Project was already marked completed");
                }
                progress.status = Some(ProjectStatus::Completed);
                Ok(Some(ProjectStatus::Completed))
            }
            Err(e) => {
                progress.has_error = true;
                progress.status = Some(ProjectStatus::FinishedWithErrors);
                Err(e)
            }
        }
    }

    pub fn remaining(&self, project: &str) -> usize {
        self.projects.get(project).map(|p| p.remaining).unwrap_or(0)
    }

    pub fn has_error(&self, project: &str) -> bool {
        self.projects.get(project).is_some_and(|p| p.has_error)
    }

    pub fn summary(&self) -> TrackerSummary {
        let mut summary = TrackerSummary::default();
        for (name, progress) in &self.projects {
            match progress.status {
                Some(ProjectStatus::Completed) => summary.completed.push(name.clone()),
                Some(ProjectStatus::FinishedWithErrors) => summary.with_errors.push(name.clone()),
                None => summary.unfinished.push(name.clone()),
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, TimeWindow};
    use crate::error::MinerError;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    /// Store whose completion writes always fail.
    struct FullDiskStore;

    impl CompletionStore for FullDiskStore {
        fn completed_project_names(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }

        fn mark_project_completed(&self, _name: &str) -> Result<bool> {
            Err(MinerError::Storage("disk full".to_string()))
        }
    }

    fn year_shard(project: &str) -> Shard {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        );
        Shard::windowed(project, format!("https://github.com/apache/{}", project), Category::Cpp, window)
    }

    fn tracker() -> (CompletionTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CompletionTracker::new(store.clone()), store)
    }

    #[test]
    fn test_single_shard_success_completes_project() {
        let (mut t, store) = tracker();
        let shard = year_shard("arrow");
        t.register(std::slice::from_ref(&shard));

        assert_eq!(t.record_terminal(&shard, false).unwrap(), Some(ProjectStatus::Completed));
        assert_eq!(store.completion_log(), vec!["arrow".to_string()]);
        assert_eq!(t.remaining("arrow"), 0);
    }

    #[test]
    fn test_split_adds_children_minus_one() {
        let (mut t, _store) = tracker();
        let shard = year_shard("arrow");
        t.register(std::slice::from_ref(&shard));
        t.record_timeout(&shard);
        t.record_timeout(&shard);

        let children = shard.split(12).unwrap();
        t.record_split(&shard, &children);

        assert_eq!(t.remaining("arrow"), 12);
        assert_eq!(t.retries(&shard), 0);
        assert!(children.iter().all(|c| t.retries(c) == 0));
    }

    #[test]
    fn test_failure_blocks_completion() {
        let (mut t, store) = tracker();
        let shards = vec![year_shard("arrow"), year_shard("arrow")];
        t.register(&shards);

        assert_eq!(t.record_terminal(&shards[0], true).unwrap(), None);
        assert_eq!(
            t.record_terminal(&shards[1], false).unwrap(),
            Some(ProjectStatus::FinishedWithErrors)
        );
        assert!(t.has_error("arrow"));
        assert!(store.completion_log().is_empty());
    }

    #[test]
    fn test_projects_tracked_independently() {
        let (mut t, store) = tracker();
        let a = year_shard("arrow");
        let k = year_shard("kudu");
        t.register(&[a.clone(), k.clone()]);

        t.record_terminal(&k, true).unwrap();
        t.record_terminal(&a, false).unwrap();

        assert_eq!(store.completion_log(), vec!["arrow".to_string()]);
        let summary = t.summary();
        assert_eq!(summary.completed, vec!["arrow".to_string()]);
        assert_eq!(summary.with_errors, vec!["kudu".to_string()]);
    }

    #[test]
    fn test_unfinished_projects_are_not_marked() {
        let (mut t, store) = tracker();
        let shards = vec![year_shard("arrow"), year_shard("arrow")];
        t.register(&shards);
        t.record_terminal(&shards[0], false).unwrap();

        assert_eq!(t.summary().unfinished, vec!["arrow".to_string()]);
        assert!(store.completion_log().is_empty());
    }

    #[test]
    fn test_already_completed_in_store_is_harmless() {
        let store = Arc::new(MemoryStore::with_completed(["arrow"]));
        let mut t = CompletionTracker::new(store.clone());
        let shard = year_shard("arrow");
        t.register(std::slice::from_ref(&shard));

        assert_eq!(t.record_terminal(&shard, false).unwrap(), Some(ProjectStatus::Completed));
        assert_eq!(store.completion_log(), vec!["arrow".to_string()]);
    }

    #[test]
    fn test_failed_completion_write_is_not_reported_completed() {
        let mut t = CompletionTracker::new(Arc::new(FullDiskStore));
        let shard = year_shard("kafka");
        t.register(std::slice::from_ref(&shard));

        assert!(matches!(t.record_terminal(&shard, false), Err(MinerError::Storage(_))));
        assert!(t.has_error("kafka"));

        let summary = t.summary();
        assert!(summary.completed.is_empty());
        assert_eq!(summary.with_errors, vec!["kafka".to_string()]);
    }
}
