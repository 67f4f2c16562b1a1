//! Rate-limited GitHub REST client.
//!
//! Every request first checks the shared stop signal. A response that reports
//! an exhausted budget trips the signal for the whole run and surfaces as
//! [`MinerError::RateLimitExceeded`]; 5xx responses are retried with linear
//! backoff, rate limits never are.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use reqwest::header::{AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::config::GithubConfig;
use crate::coordination::{StopReason, StopSignal};
use crate::crawler::rate_limit::{RateLimitStatus, ServerRetryPolicy};
use crate::domain::{CandidateProject, Category};
use crate::error::{MinerError, Result};

/// Creation-date lookup used by the shard planner.
#[async_trait]
pub trait CreationYearLookup: Send + Sync {
    /// Year the repository at `source_url` was created.
    async fn lookup_creation_year(&self, source_url: &str) -> Result<i32>;
}

#[derive(Debug, Deserialize)]
struct OrgInfo {
    #[serde(default)]
    public_repos: u64,
}

#[derive(Debug, Deserialize)]
struct RepoListing {
    name: String,
    html_url: String,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    created_at: Option<DateTime<Utc>>,
}

/// GitHub API client sharing one stop signal with the rest of the run.
pub struct GithubCrawler {
    client: Client,
    api_base: String,
    org: String,
    per_page: u32,
    token: Option<String>,
    retry: ServerRetryPolicy,
    stop: StopSignal,
}

impl GithubCrawler {
    /// Build a crawler from config, reading the token from `token_env`.
    pub fn new(config: &GithubConfig, stop: StopSignal) -> Result<Self> {
        Self::with_token(config, config.token(), stop)
    }

    pub fn with_token(config: &GithubConfig, token: Option<String>, stop: StopSignal) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MinerError::Http(format!("Failed to create HTTP client: {}", e)))?;

        if token.is_none() {
            tracing::info!("Running in unauthenticated mode (60 requests/hour)");
        }

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            per_page: config.per_page.max(1),
            token,
            retry: ServerRetryPolicy::new(config.max_server_retries, config.server_retry_backoff()),
            stop,
        })
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Number of public repositories in the configured organization.
    ///
    /// Also serves as the reachability check before discovery.
    pub async fn org_repo_count(&self) -> Result<u64> {
        let url = format!("{}/orgs/{}", self.api_base, self.org);
        let info: OrgInfo = self.get(&url, &[]).await?.json().await?;
        Ok(info.public_repos)
    }

    /// One page of the organization's repository listing, keeping only
    /// repositories whose primary language maps to one of `categories`.
    pub async fn fetch_page(&self, categories: &[Category], page: u32) -> Result<Vec<CandidateProject>> {
        let url = format!("{}/orgs/{}/repos", self.api_base, self.org);
        let query = [
            ("type", "public".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        let listings: Vec<RepoListing> = self.get(&url, &query).await?.json().await?;

        Ok(listings
            .into_iter()
            .filter_map(|repo| {
                let category = repo.language.as_deref().and_then(Category::from_language)?;
                categories
                    .contains(&category)
                    .then(|| CandidateProject::new(repo.name, category, repo.html_url))
            })
            .collect())
    }

    /// Approximate commit count, read from the `rel="last"` page of a
    /// one-commit-per-page listing.
    pub async fn commit_count(&self, source_url: &str) -> Result<u64> {
        let (owner, repo) = github_repo_path(source_url)?;
        let url = format!("{}/repos/{}/{}/commits", self.api_base, owner, repo);
        let response = self.get(&url, &[("per_page", "1".to_string())]).await?;

        let last_page = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link);
        if let Some(count) = last_page {
            return Ok(count);
        }

        let commits: Vec<serde_json::Value> = response.json().await?;
        Ok(commits.len() as u64)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut attempts = 0;
        loop {
            if self.stop.is_tripped() {
                return Err(MinerError::Stopped);
            }

            let mut request = self
                .client
                .get(url)
                .query(query)
                .header(USER_AGENT, concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("token {}", token));
            }

            let response = request.send().await?;
            self.check_rate_limit(&response)?;

            let status = response.status();
            if self.retry.should_retry(status, attempts) {
                attempts += 1;
                let delay = self.retry.delay_for(attempts);
                tracing::warn!(
                    url = %url,
                    status = status.as_u16(),
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying"
                );
                self.pause(delay).await?;
                continue;
            }

            if !status.is_success() {
                return Err(MinerError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            return Ok(response);
        }
    }

    fn check_rate_limit(&self, response: &Response) -> Result<()> {
        let status = RateLimitStatus::from_response(response.status(), response.headers());
        if status.is_exhausted() {
            self.stop.trip(StopReason::RateLimit {
                reset_at: status.reset_at,
            });
            return Err(MinerError::RateLimitExceeded {
                reset_at: status.reset_at,
            });
        }
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.stop.tripped() => Err(MinerError::Stopped),
        }
    }
}

#[async_trait]
impl CreationYearLookup for GithubCrawler {
    async fn lookup_creation_year(&self, source_url: &str) -> Result<i32> {
        let (owner, repo) = github_repo_path(source_url)?;
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let info: RepoInfo = self.get(&url, &[]).await?.json().await?;
        info.created_at
            .map(|at| at.year())
            .ok_or_else(|| MinerError::InvalidSource(format!("no created_at for {}/{}", owner, repo)))
    }
}

/// Split a GitHub web URL into `(owner, repo)`.
pub fn github_repo_path(source_url: &str) -> Result<(String, String)> {
    let parsed = Url::parse(source_url.trim())
        .map_err(|e| MinerError::InvalidSource(format!("{}: {}", source_url, e)))?;

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if host != "github.com" && host != "www.github.com" {
        return Err(MinerError::InvalidSource(format!("not a GitHub URL: {}", source_url)));
    }

    let mut segments = parsed.path_segments().into_iter().flatten().filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(MinerError::InvalidSource(format!("missing owner/repo in {}", source_url))),
    }
}

/// Page number of the `rel="last"` entry in a `Link` header.
fn last_page_from_link(link: &str) -> Option<u64> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"last\"") {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}
