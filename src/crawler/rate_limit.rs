//! Rate limit detection for the hosting API.
//!
//! Exhaustion is terminal for a run: unlike transient server errors it is
//! never retried. This module only interprets responses; tripping the shared
//! stop signal is the crawler's job.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Header carrying the number of requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Header carrying the window reset time as epoch seconds.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate limit information extracted from one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub status: u16,
    /// Remaining request budget, when the header is present and numeric
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Self {
        Self {
            status: status.as_u16(),
            remaining: header_number(headers, REMAINING_HEADER),
            reset_at: header_number(headers, RESET_HEADER)
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
        }
    }

    /// Exhausted when the status says so (403/429) or the budget header reads zero.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.status, 403 | 429) || self.remaining == Some(0)
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Linear backoff for transient server errors.
#[derive(Debug, Clone)]
pub struct ServerRetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Delay unit; attempt `n` waits `n * backoff`
    pub backoff: Duration,
}

impl Default for ServerRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl ServerRetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    /// Whether `status` is worth another attempt after `attempts_so_far` retries.
    pub fn should_retry(&self, status: StatusCode, attempts_so_far: u32) -> bool {
        status.is_server_error() && attempts_so_far < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}
