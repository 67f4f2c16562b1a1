//! Candidate projects and the repository categories they are classified into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MinerError;

/// Repository class used for quotas and shard planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Java,
    Python,
    #[serde(rename = "C++")]
    Cpp,
}

impl Category {
    /// All categories in their reporting order.
    pub const ALL: [Category; 3] = [Category::Java, Category::Python, Category::Cpp];

    /// Map a hosting platform's primary-language label to a category.
    pub fn from_language(language: &str) -> Option<Self> {
        match language {
            "Java" => Some(Category::Java),
            "Python" => Some(Category::Python),
            "C++" => Some(Category::Cpp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Java => "Java",
            Category::Python => "Python",
            Category::Cpp => "C++",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "java" => Ok(Category::Java),
            "python" => Ok(Category::Python),
            "c++" | "cpp" => Ok(Category::Cpp),
            other => Err(MinerError::Config(format!("unknown category: {}", other))),
        }
    }
}

/// A repository discovered on the hosting platform. Read-only to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProject {
    /// Unique within its category
    pub name: String,
    pub category: Category,
    /// Location strings; only the first is mined
    pub source_urls: Vec<String>,
    /// Approximate commit count, used only to order work
    pub size_hint: Option<u64>,
}

impl CandidateProject {
    pub fn new(name: impl Into<String>, category: Category, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            source_urls: vec![source_url.into()],
            size_hint: None,
        }
    }

    pub fn with_size_hint(mut self, hint: u64) -> Self {
        self.size_hint = Some(hint);
        self
    }

    /// The location that gets mined, if any non-empty one exists.
    pub fn primary_source(&self) -> Option<&str> {
        self.source_urls.first().map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}
