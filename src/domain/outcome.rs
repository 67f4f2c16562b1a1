//! Shard execution outcome types.

use std::fmt;

/// Item counts reported by one successful mining pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MineCounts {
    pub added: u64,
    pub already_present: u64,
}

impl MineCounts {
    pub fn new(added: u64, already_present: u64) -> Self {
        Self { added, already_present }
    }
}

/// Why a shard did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    /// The worker's deadline expired; retryable and eligible for split
    Timeout,
    /// Missing or unusable source; never retried
    InvalidSource(String),
    /// Anything else; treated as non-retryable
    Other(String),
}

impl ShardError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShardError::Timeout)
    }
}

impl fmt::Display for ShardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardError::Timeout => f.write_str("TIMED OUT"),
            ShardError::InvalidSource(reason) => write!(f, "invalid source: {}", reason),
            ShardError::Other(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for ShardError {}

/// Result of executing one shard. Consumed immediately by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutcome {
    pub project: String,
    pub items_added: u64,
    pub items_already_present: u64,
    pub error: Option<ShardError>,
}

impl ShardOutcome {
    pub fn success(project: impl Into<String>, counts: MineCounts) -> Self {
        Self {
            project: project.into(),
            items_added: counts.added,
            items_already_present: counts.already_present,
            error: None,
        }
    }

    pub fn failure(project: impl Into<String>, error: ShardError) -> Self {
        Self {
            project: project.into(),
            items_added: 0,
            items_already_present: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(ShardError::Timeout.is_retryable());
        assert!(!ShardError::InvalidSource("x".into()).is_retryable());
        assert!(!ShardError::Other("boom".into()).is_retryable());
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ShardOutcome::success("kafka", MineCounts::new(10, 3));
        assert!(ok.is_success());
        assert_eq!(ok.items_added, 10);
        assert_eq!(ok.items_already_present, 3);

        let timed_out = ShardOutcome::failure("kafka", ShardError::Timeout);
        assert!(!timed_out.is_success());
        assert_eq!(timed_out.error, Some(ShardError::Timeout));
        assert_eq!(timed_out.items_added, 0);
    }

    #[test]
    fn test_shard_error_display() {
        assert_eq!(ShardError::Timeout.to_string(), "TIMED OUT");
        assert_eq!(
            ShardError::InvalidSource("Skipped: Invalid or missing URL".into()).to_string(),
            "invalid source: Skipped: Invalid or missing URL"
        );
    }
}
