//! Candidate discovery over the organization's paginated repository listing.

use futures::stream::{self, StreamExt};

use crate::crawler::client::GithubCrawler;
use crate::domain::{CandidateProject, Category};
use crate::error::{MinerError, Result};
use crate::reporter::Reporter;

/// Fetch every listing page concurrently (at most `workers` in flight) and
/// keep repositories in `categories`.
///
/// A tripped stop signal aborts the whole discovery with an error, so a
/// partial listing is never mistaken for a complete one.
pub async fn discover_candidates(
    crawler: &GithubCrawler,
    categories: &[Category],
    workers: usize,
    reporter: &Reporter,
) -> Result<Vec<CandidateProject>> {
    let total_repos = crawler.org_repo_count().await?;
    if total_repos == 0 {
        reporter.warn("Received 0 repositories; check authentication or the organization name");
        return Ok(Vec::new());
    }

    let per_page = crawler.per_page() as u64;
    let total_pages = total_repos.div_ceil(per_page) as u32;
    reporter.info(format!(
        "Fetching {} pages ({} repositories) with {} workers",
        total_pages, total_repos, workers
    ));
    reporter.phase_started("FETCHING REPOS", total_pages as usize);

    let mut pages = stream::iter(1..=total_pages)
        .map(|page| async move { (page, crawler.fetch_page(categories, page).await) })
        .buffer_unordered(workers.max(1));

    let mut candidates = Vec::new();
    let mut fetched = 0;
    while let Some((page, result)) = pages.next().await {
        match result {
            Ok(found) => candidates.extend(found),
            Err(e) if e.is_fatal_for_run() => {
                reporter.phase_finished();
                return Err(stop_error(crawler, e));
            }
            Err(e) => reporter.warn(format!("Error fetching page {}: {}", page, e)),
        }
        fetched += 1;
        reporter.advance(fetched);
    }
    reporter.phase_finished();

    if crawler.stop_signal().is_tripped() {
        return Err(stop_error(crawler, MinerError::Stopped));
    }

    if candidates.is_empty() {
        reporter.warn("No matching repositories found");
    } else {
        reporter.success(format!("Found {} matching repositories", candidates.len()));
    }
    Ok(candidates)
}

/// Candidates of a single category.
pub async fn discover_category(
    crawler: &GithubCrawler,
    category: Category,
    workers: usize,
    reporter: &Reporter,
) -> Result<Vec<CandidateProject>> {
    discover_candidates(crawler, &[category], workers, reporter).await
}

/// Fill in `size_hint` from commit counts. Lookups that fail leave the hint
/// empty; once the stop signal trips the remaining lookups return immediately.
pub async fn attach_size_hints(
    crawler: &GithubCrawler,
    candidates: Vec<CandidateProject>,
    workers: usize,
    reporter: &Reporter,
) -> Vec<CandidateProject> {
    reporter.phase_started("ANALYSING", candidates.len());

    let mut hinted = Vec::with_capacity(candidates.len());
    let mut results = stream::iter(candidates)
        .map(|mut project| async move {
            let url = project.primary_source().map(str::to_string);
            if let Some(url) = url {
                match crawler.commit_count(&url).await {
                    Ok(count) => project.size_hint = Some(count),
                    Err(e) => tracing::debug!(project = %project.name, error = %e, "Commit count unavailable"),
                }
            }
            project
        })
        .buffer_unordered(workers.max(1));

    while let Some(project) = results.next().await {
        hinted.push(project);
        reporter.advance(hinted.len());
    }
    reporter.phase_finished();

    if crawler.stop_signal().is_tripped() {
        reporter.warn("Size hints incomplete: stop signal set");
    }
    hinted
}

fn stop_error(crawler: &GithubCrawler, fallback: MinerError) -> MinerError {
    match crawler.stop_signal().reason() {
        Some(crate::coordination::StopReason::RateLimit { reset_at }) => MinerError::RateLimitExceeded { reset_at },
        _ => fallback,
    }
}
