//! One batch run: sample, plan, order, mine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::coordination::StopSignal;
use crate::crawler::{CreationYearLookup, GithubCrawler, attach_size_hints, discover_candidates};
use crate::domain::Shard;
use crate::error::Result;
use crate::miner::ShardMiner;
use crate::planner::{PlannedProject, ShardPlanner};
use crate::reporter::{Reporter, format_elapsed};
use crate::sampler::{CategoryQuota, fill_quota};
use crate::scheduler::{AdaptiveScheduler, RunReport, SchedulerPolicy};
use crate::store::{CompletionStore, MinerStore};
use crate::tracker::CompletionTracker;

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunResult {
    /// Every category already meets its target
    QuotaMet(Vec<CategoryQuota>),
    /// Stopped while planning; nothing was mined
    HaltedBeforeMining(Vec<CategoryQuota>),
    Mined { quotas: Vec<CategoryQuota>, report: RunReport },
}

/// Wiring for a mining run. Every collaborator is injected so tests can
/// swap the network and git halves out.
pub struct MiningRun {
    config: Config,
    store: Arc<MinerStore>,
    lookup: Arc<dyn CreationYearLookup>,
    miner: Arc<dyn ShardMiner>,
    stop: StopSignal,
    reporter: Reporter,
}

impl MiningRun {
    pub fn new(
        config: Config,
        store: Arc<MinerStore>,
        lookup: Arc<dyn CreationYearLookup>,
        miner: Arc<dyn ShardMiner>,
        stop: StopSignal,
        reporter: Reporter,
    ) -> Self {
        Self {
            config,
            store,
            lookup,
            miner,
            stop,
            reporter,
        }
    }

    pub async fn execute(&self) -> Result<RunResult> {
        let started = Instant::now();

        let completed = self.store.completed_project_names()?;
        let candidates = self.store.all_candidates()?;
        tracing::info!(candidates = candidates.len(), completed = completed.len(), "Loaded run state");

        let mut rng = match self.config.quota.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let selection = fill_quota(
            &candidates,
            &completed,
            self.config.quota.target_per_category,
            &self.config.quota.categories,
            &mut rng,
        );
        for quota in &selection.per_category {
            self.reporter.info(format!(
                "{}: {} mined, {} needed, {} available, {} selected",
                quota.category,
                quota.completed,
                quota.needed(),
                quota.available,
                quota.selected
            ));
        }

        if selection.selected.is_empty() {
            self.reporter.success("All quotas met or no candidates available");
            return Ok(RunResult::QuotaMet(selection.per_category));
        }

        let planner = ShardPlanner::new(self.lookup.clone(), &self.config.planning, self.stop.clone());
        let planned = planner
            .plan_all(selection.selected, self.config.planning.workers, &self.reporter)
            .await;

        if let Some(reason) = self.stop.reason() {
            self.reporter.error(format!("Halted before mining: {}", reason));
            return Ok(RunResult::HaltedBeforeMining(selection.per_category));
        }

        let shards = order_by_size(planned);
        if shards.is_empty() {
            self.reporter.warn("No shards to mine");
        }

        let workers = self.config.mining.effective_workers(shards.len());
        self.reporter.info(format!("Mining {} shards with {} workers", shards.len(), workers));

        let store: Arc<dyn CompletionStore> = self.store.clone();
        let mut tracker = CompletionTracker::new(store);
        let scheduler = AdaptiveScheduler::new(
            self.miner.clone(),
            SchedulerPolicy::from_config(&self.config.mining),
            workers,
            self.stop.clone(),
            self.reporter.clone(),
        )
        .with_worker_activity(self.config.mining.show_worker_activity);

        let report = scheduler.run(shards, &mut tracker).await;
        self.report_summary(&report);
        self.reporter
            .info(format!("Total execution time: {}", format_elapsed(started.elapsed())));

        Ok(RunResult::Mined {
            quotas: selection.per_category,
            report,
        })
    }

    fn report_summary(&self, report: &RunReport) {
        let summary = &report.summary;
        self.reporter.info(format!(
            "{} shards finished, {} retries, {} splits, {} cancelled; {} new items, {} already stored",
            report.finished_shards,
            report.retries,
            report.splits,
            report.cancelled_shards,
            report.items_added,
            report.items_already_present
        ));
        if !summary.completed.is_empty() {
            self.reporter
                .success(format!("Completed: {}", summary.completed.join(", ")));
        }
        if !summary.with_errors.is_empty() {
            self.reporter
                .warn(format!("Finished with errors: {}", summary.with_errors.join(", ")));
        }
        if !summary.unfinished.is_empty() {
            self.reporter
                .warn(format!("Unfinished: {}", summary.unfinished.join(", ")));
        }
        if let Some(reason) = &report.stop_reason {
            self.reporter.error(format!("Run stopped: {}", reason));
        }
    }
}

/// Flatten planned projects into one submission order: largest size hint
/// first, projects without a hint last, a project's shards kept together.
pub fn order_by_size(mut planned: Vec<PlannedProject>) -> Vec<Shard> {
    planned.sort_by(|a, b| {
        b.project
            .size_hint
            .cmp(&a.project.size_hint)
            .then_with(|| a.project.name.cmp(&b.project.name))
    });
    planned.into_iter().flat_map(|p| p.shards).collect()
}

/// Crawl the organization listing into the candidate table.
pub async fn discover_into_store(
    crawler: &GithubCrawler,
    store: &MinerStore,
    config: &Config,
    with_size_hints: bool,
    reporter: &Reporter,
) -> Result<usize> {
    let mut candidates = discover_candidates(
        crawler,
        &config.quota.categories,
        config.github.discovery_workers,
        reporter,
    )
    .await?;

    if with_size_hints {
        candidates = attach_size_hints(crawler, candidates, config.github.discovery_workers, reporter).await;
    }

    let mut per_category: HashMap<String, usize> = HashMap::new();
    for c in &candidates {
        *per_category.entry(c.category.to_string()).or_default() += 1;
    }
    for (category, count) in &per_category {
        tracing::info!(category = %category, count = count, "Discovered candidates");
    }

    store.upsert_candidates(&candidates)
}
