//! Rate-limited crawling of the hosting platform's REST API.
//!
//! - **client**: `GithubCrawler`, the stop-signal aware HTTP client
//! - **rate_limit**: exhaustion detection and 5xx retry policy
//! - **discovery**: paginated candidate discovery and size hints

mod client;
pub mod discovery;
mod rate_limit;

pub use client::{CreationYearLookup, GithubCrawler, github_repo_path};
pub use discovery::{attach_size_hints, discover_candidates, discover_category};
pub use rate_limit::{RateLimitStatus, ServerRetryPolicy};
