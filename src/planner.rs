//! Shard planning: turn candidate projects into depth-0 shards.
//!
//! Categories listed in `sharded_categories` get one shard per calendar year
//! from the repository's creation year up to now; everything else is mined as
//! a single whole-history shard.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use futures::stream::{self, StreamExt};

use crate::config::PlanningConfig;
use crate::coordination::StopSignal;
use crate::crawler::CreationYearLookup;
use crate::domain::{CandidateProject, Category, Shard, TimeWindow};
use crate::reporter::Reporter;

/// A candidate together with the shards planned for it.
#[derive(Debug, Clone)]
pub struct PlannedProject {
    pub project: CandidateProject,
    pub shards: Vec<Shard>,
}

pub struct ShardPlanner {
    lookup: Arc<dyn CreationYearLookup>,
    sharded_categories: Vec<Category>,
    default_start_year: i32,
    stop: StopSignal,
}

impl ShardPlanner {
    pub fn new(lookup: Arc<dyn CreationYearLookup>, config: &PlanningConfig, stop: StopSignal) -> Self {
        Self {
            lookup,
            sharded_categories: config.sharded_categories.clone(),
            default_start_year: config.default_start_year,
            stop,
        }
    }

    pub async fn plan_shards(&self, project: &CandidateProject) -> Vec<Shard> {
        self.plan_shards_at(project, Utc::now()).await
    }

    /// Plan against a fixed `now`. Never fails: a project without a source
    /// yields no shards, a failed creation lookup falls back to the default
    /// start year.
    pub async fn plan_shards_at(&self, project: &CandidateProject, now: DateTime<Utc>) -> Vec<Shard> {
        let Some(source) = project.primary_source() else {
            tracing::warn!(project = %project.name, "No source URL, nothing to plan");
            return Vec::new();
        };

        if !self.sharded_categories.contains(&project.category) {
            return vec![Shard::whole(&project.name, source, project.category)];
        }

        let start_year = match self.lookup.lookup_creation_year(source).await {
            Ok(year) => year,
            Err(e) => {
                tracing::debug!(
                    project = %project.name,
                    error = %e,
                    fallback = self.default_start_year,
                    "Creation year lookup failed"
                );
                self.default_start_year
            }
        };

        let windows = year_windows(start_year, now);
        if windows.is_empty() {
            return vec![Shard::whole(&project.name, source, project.category)];
        }
        windows
            .into_iter()
            .map(|w| Shard::windowed(&project.name, source, project.category, w))
            .collect()
    }

    /// Plan many projects with at most `workers` lookups in flight.
    ///
    /// Projects not yet started when the stop signal trips are skipped, so no
    /// lookup is issued after it.
    pub async fn plan_all(
        &self,
        projects: Vec<CandidateProject>,
        workers: usize,
        reporter: &Reporter,
    ) -> Vec<PlannedProject> {
        reporter.phase_started("PLANNING", projects.len());

        let mut planned = stream::iter(projects)
            .map(|project| async move {
                if self.stop.is_tripped() {
                    return None;
                }
                let shards = self.plan_shards(&project).await;
                Some(PlannedProject { project, shards })
            })
            .buffer_unordered(workers.max(1));

        let mut results = Vec::new();
        let mut done = 0;
        while let Some(result) = planned.next().await {
            done += 1;
            reporter.advance(done);
            if let Some(p) = result {
                results.push(p);
            }
        }
        reporter.phase_finished();

        let shard_count: usize = results.iter().map(|p| p.shards.len()).sum();
        tracing::info!(projects = results.len(), shards = shard_count, "Planning finished");
        results
    }
}

/// Calendar-year windows from `start_year` through the year of `now`, the
/// last one ending at `now`.
pub fn year_windows(start_year: i32, now: DateTime<Utc>) -> Vec<TimeWindow> {
    (start_year..=now.year())
        .filter_map(|year| {
            let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
            let next = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?;
            let window = TimeWindow::new(start, next.min(now));
            (!window.is_empty()).then_some(window)
        })
        .collect()
}
