//! The task body run for every shard.
//!
//! The deadline is enforced here, inside the spawned task, not by the
//! controller: on expiry the mining future is dropped (killing any `git`
//! child) and the worker reports a timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::coordination::StopSignal;
use crate::domain::{Shard, ShardError, ShardOutcome};
use crate::miner::ShardMiner;
use crate::reporter::Reporter;

/// What a worker hands back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Finished(ShardOutcome),
    /// The stop signal was set before or while the shard ran
    Cancelled,
}

/// Everything a worker needs besides its shard. Cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub miner: Arc<dyn ShardMiner>,
    pub stop: StopSignal,
    pub deadline: Duration,
    /// Set when per-shard start/done lines are wanted
    pub activity: Option<Reporter>,
}

pub async fn run_shard(ctx: WorkerContext, shard: Shard, delay: Duration) -> WorkerResult {
    if ctx.stop.is_tripped() {
        return WorkerResult::Cancelled;
    }

    if !delay.is_zero() {
        tokio::select! {
            _ = ctx.stop.tripped() => return WorkerResult::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    if let Some(reporter) = &ctx.activity {
        reporter.shard_started(shard.to_string());
    }

    let token = ctx.stop.child_token();
    let outcome = match tokio::time::timeout(ctx.deadline, ctx.miner.mine_shard(&shard, token.clone())).await {
        Ok(Ok(counts)) => ShardOutcome::success(&shard.project, counts),
        Ok(Err(_)) if ctx.stop.is_tripped() => return WorkerResult::Cancelled,
        Ok(Err(e)) => ShardOutcome::failure(&shard.project, e),
        Err(_) => {
            token.cancel();
            tracing::debug!(shard = %shard, deadline_secs = ctx.deadline.as_secs(), "Shard deadline expired");
            ShardOutcome::failure(&shard.project, ShardError::Timeout)
        }
    };

    if let Some(reporter) = &ctx.activity {
        reporter.shard_finished(shard.to_string(), outcome.is_success());
    }

    WorkerResult::Finished(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::StopReason;
    use crate::domain::{Category, MineCounts};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct SlowMiner {
        sleep: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ShardMiner for SlowMiner {
        async fn mine_shard(&self, _shard: &Shard, cancel: CancellationToken) -> Result<MineCounts, ShardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => Err(ShardError::Other("cancelled".to_string())),
                _ = tokio::time::sleep(self.sleep) => Ok(MineCounts::new(3, 1)),
            }
        }
    }

    fn ctx(sleep: Duration, deadline: Duration, stop: StopSignal) -> (WorkerContext, Arc<SlowMiner>) {
        let miner = Arc::new(SlowMiner {
            sleep,
            calls: AtomicUsize::new(0),
        });
        let ctx = WorkerContext {
            miner: miner.clone(),
            stop,
            deadline,
            activity: None,
        };
        (ctx, miner)
    }

    fn shard() -> Shard {
        Shard::whole("kafka", "https://github.com/apache/kafka", Category::Java)
    }

    #[tokio::test]
    async fn test_success_reports_counts() {
        let (ctx, _) = ctx(Duration::from_millis(1), Duration::from_secs(5), StopSignal::new());
        let result = run_shard(ctx, shard(), Duration::ZERO).await;
        assert_eq!(
            result,
            WorkerResult::Finished(ShardOutcome::success("kafka", MineCounts::new(3, 1)))
        );
    }

    #[tokio::test]
    async fn test_deadline_reports_timeout() {
        let (ctx, _) = ctx(Duration::from_secs(30), Duration::from_millis(20), StopSignal::new());
        let result = run_shard(ctx, shard(), Duration::ZERO).await;
        assert_eq!(
            result,
            WorkerResult::Finished(ShardOutcome::failure("kafka", ShardError::Timeout))
        );
    }

    #[tokio::test]
    async fn test_tripped_signal_skips_mining() {
        let stop = StopSignal::new();
        stop.trip(StopReason::Interrupt);
        let (ctx, miner) = ctx(Duration::from_millis(1), Duration::from_secs(5), stop);

        assert_eq!(run_shard(ctx, shard(), Duration::ZERO).await, WorkerResult::Cancelled);
        assert_eq!(miner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_backoff_cancels() {
        let stop = StopSignal::new();
        let (ctx, miner) = ctx(Duration::from_millis(1), Duration::from_secs(5), stop.clone());
        let handle = tokio::spawn(run_shard(ctx, shard(), Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.trip(StopReason::Interrupt);

        assert_eq!(handle.await.unwrap(), WorkerResult::Cancelled);
        assert_eq!(miner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_while_mining_is_cancelled_not_failed() {
        let stop = StopSignal::new();
        let (ctx, _) = ctx(Duration::from_secs(30), Duration::from_secs(60), stop.clone());
        let handle = tokio::spawn(run_shard(ctx, shard(), Duration::ZERO));

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.trip(StopReason::RateLimit { reset_at: None });

        assert_eq!(handle.await.unwrap(), WorkerResult::Cancelled);
    }
}
