//! The controller loop.
//!
//! Keeps the pool saturated from a local queue, waits for any one worker to
//! finish, applies the timeout policy to that single result and feeds retries
//! and split children straight back into the same pool. All bookkeeping
//! happens here, on one task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{Id, JoinError, JoinSet};

use crate::coordination::{StopReason, StopSignal};
use crate::domain::{Shard, ShardError, ShardOutcome};
use crate::miner::ShardMiner;
use crate::reporter::Reporter;
use crate::scheduler::policy::{SchedulerPolicy, TimeoutDecision};
use crate::scheduler::worker::{WorkerContext, WorkerResult, run_shard};
use crate::tracker::{CompletionTracker, ProjectStatus, TrackerSummary};

/// Totals of one mining phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub summary: TrackerSummary,
    /// Shards that reached a terminal outcome
    pub finished_shards: usize,
    pub retries: usize,
    pub splits: usize,
    /// Shards never run, or abandoned, because of the stop signal
    pub cancelled_shards: usize,
    pub items_added: u64,
    pub items_already_present: u64,
    pub stop_reason: Option<StopReason>,
}

struct Job {
    shard: Shard,
    delay: Duration,
}

impl Job {
    fn fresh(shard: Shard) -> Self {
        Self {
            shard,
            delay: Duration::ZERO,
        }
    }
}

pub struct AdaptiveScheduler {
    miner: Arc<dyn ShardMiner>,
    policy: SchedulerPolicy,
    max_workers: usize,
    stop: StopSignal,
    reporter: Reporter,
    show_worker_activity: bool,
}

impl AdaptiveScheduler {
    pub fn new(
        miner: Arc<dyn ShardMiner>,
        policy: SchedulerPolicy,
        max_workers: usize,
        stop: StopSignal,
        reporter: Reporter,
    ) -> Self {
        Self {
            miner,
            policy,
            max_workers: max_workers.max(1),
            stop,
            reporter,
            show_worker_activity: false,
        }
    }

    pub fn with_worker_activity(mut self, enabled: bool) -> Self {
        self.show_worker_activity = enabled;
        self
    }

    /// Mine `shards` to completion or until the stop signal trips.
    ///
    /// Shards are registered with `tracker` first and submitted in the given
    /// order.
    pub async fn run(&self, shards: Vec<Shard>, tracker: &mut CompletionTracker) -> RunReport {
        tracker.register(&shards);

        let ctx = WorkerContext {
            miner: self.miner.clone(),
            stop: self.stop.clone(),
            deadline: self.policy.shard_timeout,
            activity: self.show_worker_activity.then(|| self.reporter.clone()),
        };

        let mut state = LoopState {
            queue: shards.into_iter().map(Job::fresh).collect(),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            report: RunReport::default(),
        };

        self.reporter.phase_started("MINING", state.queue.len());
        tracing::info!(shards = state.queue.len(), workers = self.max_workers, "Mining started");

        loop {
            while state.tasks.len() < self.max_workers && !self.stop.is_tripped() {
                let Some(job) = state.queue.pop_front() else {
                    break;
                };
                state.spawn(&ctx, job);
            }

            if state.tasks.is_empty() {
                break;
            }
            self.reporter
                .pool(state.queue.len(), state.tasks.len(), state.report.finished_shards);

            tokio::select! {
                biased;
                _ = self.stop.tripped() => break,
                Some(joined) = state.tasks.join_next_with_id() => {
                    let (shard, result) = state.take(joined);
                    if let Some(shard) = shard {
                        self.handle_result(&mut state, tracker, shard, result);
                    }
                }
            }
        }

        if self.stop.is_tripped() {
            self.drain(&mut state, tracker).await;
        }

        self.reporter.pool(0, 0, state.report.finished_shards);
        self.reporter.phase_finished();

        let mut report = state.report;
        report.summary = tracker.summary();
        report.stop_reason = self.stop.reason();
        tracing::info!(
            finished = report.finished_shards,
            retries = report.retries,
            splits = report.splits,
            cancelled = report.cancelled_shards,
            "Mining finished"
        );
        report
    }

    fn handle_result(
        &self,
        state: &mut LoopState,
        tracker: &mut CompletionTracker,
        shard: Shard,
        result: Result<WorkerResult, JoinError>,
    ) {
        let outcome = match result {
            Ok(WorkerResult::Finished(outcome)) => outcome,
            Ok(WorkerResult::Cancelled) => {
                state.report.cancelled_shards += 1;
                return;
            }
            Err(e) if e.is_cancelled() => {
                state.report.cancelled_shards += 1;
                return;
            }
            Err(e) => {
                tracing::error!(shard = %shard, error = %e, "Worker task panicked");
                ShardOutcome::failure(&shard.project, ShardError::Other(format!("worker panicked: {}", e)))
            }
        };

        match &outcome.error {
            None => {
                state.report.items_added += outcome.items_added;
                state.report.items_already_present += outcome.items_already_present;
                tracing::info!(
                    shard = %shard,
                    added = outcome.items_added,
                    present = outcome.items_already_present,
                    "Shard mined"
                );
                self.finish(state, tracker, &shard, false);
            }
            Some(error) if error.is_retryable() => self.handle_timeout(state, tracker, shard),
            Some(error) => {
                self.reporter
                    .error(format!("{} {}: {}", shard.project, shard.window_label(), error));
                self.finish(state, tracker, &shard, true);
            }
        }
    }

    fn handle_timeout(&self, state: &mut LoopState, tracker: &mut CompletionTracker, shard: Shard) {
        let attempt = tracker.record_timeout(&shard);
        match self.policy.on_timeout(&shard, attempt) {
            TimeoutDecision::Retry { delay } => {
                state.report.retries += 1;
                self.reporter.warn(format!(
                    "{} {} timed out, retry {}/{} in {}s",
                    shard.project,
                    shard.window_label(),
                    attempt,
                    self.policy.max_retries,
                    delay.as_secs()
                ));
                state.queue.push_back(Job { shard, delay });
            }
            TimeoutDecision::Split { children } => {
                state.report.splits += 1;
                self.reporter.warn(format!(
                    "{} {} timed out {} times, splitting into {} shards at depth {}",
                    shard.project,
                    shard.window_label(),
                    attempt,
                    children.len(),
                    shard.depth + 1
                ));
                tracker.record_split(&shard, &children);
                for child in children.into_iter().rev() {
                    state.queue.push_front(Job::fresh(child));
                }
            }
            TimeoutDecision::GiveUp => {
                self.reporter.error(format!(
                    "{} {} failed after {} retries",
                    shard.project,
                    shard.window_label(),
                    self.policy.max_retries
                ));
                self.finish(state, tracker, &shard, true);
            }
        }
    }

    fn finish(&self, state: &mut LoopState, tracker: &mut CompletionTracker, shard: &Shard, failed: bool) {
        state.report.finished_shards += 1;
        match tracker.record_terminal(shard, failed) {
            Ok(Some(ProjectStatus::Completed)) => {
                self.reporter.success(format!("Project {} completed", shard.project));
            }
            Ok(Some(ProjectStatus::FinishedWithErrors)) => {
                self.reporter
                    .warn(format!("Project {} finished with errors", shard.project));
            }
            Ok(None) => {}
            Err(e) => {
                self.reporter
                    .error(format!("Failed to mark {} completed: {}", shard.project, e));
            }
        }
    }

    /// Abort outstanding workers. Successes that raced the stop still count;
    /// everything else is cancelled.
    async fn drain(&self, state: &mut LoopState, tracker: &mut CompletionTracker) {
        let reason = self.stop.reason().map(|r| r.to_string()).unwrap_or_default();
        self.reporter.warn(format!(
            "Stopping: {} ({} running, {} queued)",
            reason,
            state.tasks.len(),
            state.queue.len()
        ));

        state.report.cancelled_shards += state.queue.len();
        state.queue.clear();
        state.tasks.abort_all();

        while let Some(joined) = state.tasks.join_next_with_id().await {
            let (shard, result) = state.take(joined);
            match (shard, result) {
                (Some(shard), Ok(WorkerResult::Finished(outcome))) if outcome.is_success() => {
                    state.report.items_added += outcome.items_added;
                    state.report.items_already_present += outcome.items_already_present;
                    self.finish(state, tracker, &shard, false);
                }
                _ => state.report.cancelled_shards += 1,
            }
        }
    }
}

struct LoopState {
    queue: VecDeque<Job>,
    tasks: JoinSet<WorkerResult>,
    in_flight: HashMap<Id, Shard>,
    report: RunReport,
}

impl LoopState {
    fn spawn(&mut self, ctx: &WorkerContext, job: Job) {
        let shard = job.shard.clone();
        let handle = self.tasks.spawn(run_shard(ctx.clone(), job.shard, job.delay));
        self.in_flight.insert(handle.id(), shard);
    }

    /// Resolve a joined task back to its shard.
    fn take(&mut self, joined: Result<(Id, WorkerResult), JoinError>) -> (Option<Shard>, Result<WorkerResult, JoinError>) {
        match joined {
            Ok((id, result)) => (self.in_flight.remove(&id), Ok(result)),
            Err(e) => (self.in_flight.remove(&e.id()), Err(e)),
        }
    }
}
