//! Retry-then-split policy applied to timed-out shards.

use std::time::Duration;

use crate::config::MiningConfig;
use crate::domain::Shard;

/// What to do with a shard after its `attempt`-th timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutDecision {
    /// Run the same shard again after `delay`
    Retry { delay: Duration },
    /// Replace the shard by these children, one level deeper
    Split { children: Vec<Shard> },
    /// Retries exhausted; the shard failed permanently
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub max_retries: u32,
    /// Timeout count at which a splittable shard is split instead of retried
    pub split_after_retry: u32,
    pub sub_shards: u32,
    pub max_split_depth: u32,
    pub shard_timeout: Duration,
    /// Multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self::from_config(&MiningConfig::default())
    }
}

impl SchedulerPolicy {
    pub fn from_config(config: &MiningConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            split_after_retry: config.split_after_retry,
            sub_shards: config.sub_shards,
            max_split_depth: config.max_split_depth,
            shard_timeout: Duration::from_secs(config.shard_timeout_secs),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    /// Decide the fate of `shard` after its `attempt`-th timeout (1-based).
    ///
    /// Shards at `max_split_depth`, or without a window, are only ever
    /// retried.
    pub fn on_timeout(&self, shard: &Shard, attempt: u32) -> TimeoutDecision {
        if attempt > self.max_retries {
            return TimeoutDecision::GiveUp;
        }

        if attempt >= self.split_after_retry
            && shard.depth < self.max_split_depth
            && let Some(children) = shard.split(self.sub_shards)
        {
            return TimeoutDecision::Split { children };
        }

        TimeoutDecision::Retry {
            delay: self.retry_backoff * attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, TimeWindow};
    use chrono::{TimeZone, Utc};

    fn year_shard(depth: u32) -> Shard {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        );
        Shard {
            depth,
            ..Shard::windowed("arrow", "https://github.com/apache/arrow", Category::Cpp, window)
        }
    }

    #[test]
    fn test_first_timeout_retries_with_backoff() {
        let policy = SchedulerPolicy::default();
        assert_eq!(
            policy.on_timeout(&year_shard(0), 1),
            TimeoutDecision::Retry {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_second_timeout_splits_into_twelve() {
        let policy = SchedulerPolicy::default();
        match policy.on_timeout(&year_shard(0), 2) {
            TimeoutDecision::Split { children } => {
                assert_eq!(children.len(), 12);
                assert!(children.iter().all(|c| c.depth == 1));
            }
            other => panic!("expected split, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_cap_only_retries_then_gives_up() {
        let policy = SchedulerPolicy::default();
        let shard = year_shard(policy.max_split_depth);
        for attempt in 1..=policy.max_retries {
            assert!(matches!(
                policy.on_timeout(&shard, attempt),
                TimeoutDecision::Retry { .. }
            ));
        }
        assert_eq!(policy.on_timeout(&shard, policy.max_retries + 1), TimeoutDecision::GiveUp);
    }

    #[test]
    fn test_whole_history_shard_is_never_split() {
        let policy = SchedulerPolicy::default();
        let shard = Shard::whole("kafka", "https://github.com/apache/kafka", Category::Java);
        assert!(matches!(policy.on_timeout(&shard, 2), TimeoutDecision::Retry { .. }));
        assert!(matches!(policy.on_timeout(&shard, 3), TimeoutDecision::Retry { .. }));
        assert_eq!(policy.on_timeout(&shard, 4), TimeoutDecision::GiveUp);
    }

    #[test]
    fn test_split_threshold_is_tunable() {
        let policy = SchedulerPolicy {
            split_after_retry: 1,
            sub_shards: 4,
            ..Default::default()
        };
        match policy.on_timeout(&year_shard(0), 1) {
            TimeoutDecision::Split { children } => assert_eq!(children.len(), 4),
            other => panic!("expected split, got {:?}", other),
        }
    }
}
