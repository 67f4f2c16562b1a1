//! Shards: immutable units of mining work.
//!
//! A shard names a project, its source location and an optional half-open
//! time window. Failed shards are never mutated; they are either retried
//! as-is or replaced by children produced with [`Shard::split`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::project::Category;

/// Half-open interval `[start, end)` of commit timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Divide into `parts` contiguous windows of equal length.
    ///
    /// The last part always ends exactly at `self.end` so rounding never
    /// loses or duplicates a boundary.
    pub fn split(&self, parts: u32) -> Vec<TimeWindow> {
        if parts <= 1 || self.is_empty() {
            return vec![*self];
        }

        let segment = (self.end - self.start) / parts as i32;
        (0..parts)
            .map(|i| {
                let start = self.start + segment * i as i32;
                let end = if i + 1 == parts {
                    self.end
                } else {
                    self.start + segment * (i as i32 + 1)
                };
                TimeWindow::new(start, end)
            })
            .collect()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.format("%Y-%m"), self.end.format("%Y-%m"))
    }
}

/// The unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shard {
    pub project: String,
    pub source_url: String,
    /// `None` means the entire history
    pub window: Option<TimeWindow>,
    pub category: Category,
    /// Number of splits in this shard's lineage
    pub depth: u32,
}

impl Shard {
    /// A depth-0 shard covering the whole history.
    pub fn whole(project: impl Into<String>, source_url: impl Into<String>, category: Category) -> Self {
        Self {
            project: project.into(),
            source_url: source_url.into(),
            window: None,
            category,
            depth: 0,
        }
    }

    /// A depth-0 shard restricted to `window`.
    pub fn windowed(
        project: impl Into<String>,
        source_url: impl Into<String>,
        category: Category,
        window: TimeWindow,
    ) -> Self {
        Self {
            window: Some(window),
            ..Self::whole(project, source_url, category)
        }
    }

    /// Children covering this shard's window, one level deeper.
    ///
    /// Returns `None` for whole-history shards, which have no window to divide.
    pub fn split(&self, parts: u32) -> Option<Vec<Shard>> {
        let window = self.window?;
        let children = window
            .split(parts)
            .into_iter()
            .map(|w| Shard {
                project: self.project.clone(),
                source_url: self.source_url.clone(),
                window: Some(w),
                category: self.category,
                depth: self.depth + 1,
            })
            .collect();
        Some(children)
    }

    /// Human-readable window label: `(2019-01 to 2020-01)` or `(START to NOW)`.
    pub fn window_label(&self) -> String {
        match &self.window {
            Some(w) => format!("({})", w),
            None => "(START to NOW)".to_string(),
        }
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}] (depth {})", self.project, self.window_label(), self.category, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_split_window_is_contiguous_and_exact() {
        let window = TimeWindow::new(ymd(2020, 1, 1), ymd(2021, 1, 1));
        let parts = window.split(12);

        assert_eq!(parts.len(), 12);
        assert_eq!(parts[0].start, window.start);
        assert_eq!(parts[11].end, window.end);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        // 366 days / 12
        assert_eq!(parts[0].end - parts[0].start, Duration::hours(732));
    }

    #[test]
    fn test_split_window_single_part() {
        let window = TimeWindow::new(ymd(2020, 1, 1), ymd(2021, 1, 1));
        assert_eq!(window.split(1), vec![window]);
        assert_eq!(window.split(0), vec![window]);
    }

    #[test]
    fn test_shard_split_increments_depth() {
        let shard = Shard::windowed(
            "arrow",
            "https://github.com/apache/arrow",
            Category::Cpp,
            TimeWindow::new(ymd(2020, 1, 1), ymd(2021, 1, 1)),
        );

        let children = shard.split(12).unwrap();
        assert_eq!(children.len(), 12);
        assert!(children.iter().all(|c| c.depth == 1));
        assert!(children.iter().all(|c| c.project == "arrow"));
        assert_eq!(shard.depth, 0);
    }

    #[test]
    fn test_whole_history_shard_cannot_split() {
        let shard = Shard::whole("kafka", "https://github.com/apache/kafka", Category::Java);
        assert!(shard.split(12).is_none());
    }

    #[test]
    fn test_window_label() {
        let whole = Shard::whole("kafka", "u", Category::Java);
        assert_eq!(whole.window_label(), "(START to NOW)");

        let windowed = Shard::windowed("arrow", "u", Category::Cpp, TimeWindow::new(ymd(2019, 1, 1), ymd(2020, 1, 1)));
        assert_eq!(windowed.window_label(), "(2019-01 to 2020-01)");
    }

    #[test]
    fn test_split_children_are_distinct_identities() {
        let shard = Shard::windowed("arrow", "u", Category::Cpp, TimeWindow::new(ymd(2020, 1, 1), ymd(2021, 1, 1)));
        let children = shard.split(4).unwrap();
        let unique: std::collections::HashSet<_> = children.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(!unique.contains(&shard));
    }
}
