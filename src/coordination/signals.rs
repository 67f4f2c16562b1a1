//! Run-wide stop signal.
//!
//! Tripped at most once per run, either by the crawler when the hosting API
//! reports an exhausted request budget or by an operator interrupt. Every
//! network call and every worker checks it before doing any work. There is
//! no reset.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Why the run was stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Request budget exhausted
    RateLimit { reset_at: Option<DateTime<Utc>> },
    /// Ctrl-C or another operator request
    Interrupt,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::RateLimit { reset_at: Some(at) } => write!(f, "rate limit reached, resets at {}", at.to_rfc3339()),
            StopReason::RateLimit { reset_at: None } => f.write_str("rate limit reached"),
            StopReason::Interrupt => f.write_str("interrupted by operator"),
        }
    }
}

/// Cheaply cloneable handle to the shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Returns `true` only for the call that actually tripped it;
    /// later callers keep the first reason.
    pub fn trip(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason.clone()).is_ok();
        if first {
            tracing::warn!(reason = %reason, "Stop signal tripped");
        }
        self.token.cancel();
        first
    }

    pub fn is_tripped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().cloned()
    }

    /// Resolves once the signal has been tripped.
    pub async fn tripped(&self) {
        self.token.cancelled().await
    }

    /// Token cancelled when the signal trips, or earlier by its holder.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_signal_is_clear() {
        let stop = StopSignal::new();
        assert!(!stop.is_tripped());
        assert!(stop.reason().is_none());
    }

    #[test]
    fn test_first_trip_wins() {
        let stop = StopSignal::new();
        assert!(stop.trip(StopReason::RateLimit { reset_at: None }));
        assert!(!stop.trip(StopReason::Interrupt));

        assert!(stop.is_tripped());
        assert_eq!(stop.reason(), Some(StopReason::RateLimit { reset_at: None }));
    }

    #[test]
    fn test_clones_share_state() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        clone.trip(StopReason::Interrupt);
        assert!(stop.is_tripped());
        assert_eq!(stop.reason(), Some(StopReason::Interrupt));
    }

    #[test]
    fn test_child_token_follows_signal() {
        let stop = StopSignal::new();
        let child = stop.child_token();
        assert!(!child.is_cancelled());
        stop.trip(StopReason::Interrupt);
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_cancelling_child_does_not_trip_signal() {
        let stop = StopSignal::new();
        let child = stop.child_token();
        child.cancel();
        assert!(!stop.is_tripped());
    }

    #[tokio::test]
    async fn test_tripped_wakes_waiters() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.tripped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.trip(StopReason::Interrupt);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
