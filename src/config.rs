use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub github: GithubConfig,
    pub quota: QuotaConfig,
    pub planning: PlanningConfig,
    pub mining: MiningConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub org: String,
    /// Name of the environment variable holding the API token
    pub token_env: String,
    pub per_page: u32,
    pub request_timeout_ms: u64,
    pub max_server_retries: u32,
    pub server_retry_backoff_ms: u64,
    pub discovery_workers: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            org: "apache".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            per_page: 100,
            request_timeout_ms: 10000,
            max_server_retries: 3,
            server_retry_backoff_ms: 1000,
            discovery_workers: 50,
        }
    }
}

impl GithubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn server_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.server_retry_backoff_ms)
    }

    /// Resolve the API token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub target_per_category: usize,
    pub categories: Vec<Category>,
    /// Fixed seed for reproducible sampling; random when absent
    pub seed: Option<u64>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            target_per_category: 60,
            categories: Category::ALL.to_vec(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub workers: usize,
    /// Categories whose histories are split into calendar-year shards
    pub sharded_categories: Vec<Category>,
    pub default_start_year: i32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            sharded_categories: vec![Category::Cpp],
            default_start_year: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Worker pool size; defaults to twice the core count
    pub max_workers: Option<usize>,
    pub shard_timeout_secs: u64,
    pub max_retries: u32,
    pub split_after_retry: u32,
    pub sub_shards: u32,
    pub max_split_depth: u32,
    pub retry_backoff_secs: u64,
    pub batch_size: usize,
    pub show_worker_activity: bool,
    pub clone_dir: PathBuf,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            shard_timeout_secs: 2700,
            max_retries: 3,
            split_after_retry: 2,
            sub_shards: 12,
            max_split_depth: 3,
            retry_backoff_secs: 5,
            batch_size: 250,
            show_worker_activity: false,
            clone_dir: default_data_dir().join("clones"),
        }
    }
}

impl MiningConfig {
    /// Pool size for a run with `total_shards` initial shards.
    pub fn effective_workers(&self, total_shards: usize) -> usize {
        let configured = self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(6)
                * 2
        });
        configured.min(total_shards).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repominer")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            github: GithubConfig::default(),
            quota: QuotaConfig::default(),
            planning: PlanningConfig::default(),
            mining: MiningConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `MAX_WORKERS`, `WORKER_TIMEOUT`, `BATCH_SIZE`, `TARGET_QUOTA`
    /// and `SHOW_WORKER_ACTIVITY` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = parse_env::<usize>(&lookup, "MAX_WORKERS") {
            self.mining.max_workers = Some(workers.max(1));
        }
        if let Some(secs) = parse_env::<u64>(&lookup, "WORKER_TIMEOUT") {
            self.mining.shard_timeout_secs = secs;
        }
        if let Some(size) = parse_env::<usize>(&lookup, "BATCH_SIZE") {
            self.mining.batch_size = size.max(1);
        }
        if let Some(target) = parse_env::<usize>(&lookup, "TARGET_QUOTA") {
            self.quota.target_per_category = target;
        }
        if let Some(flag) = lookup("SHOW_WORKER_ACTIVITY") {
            self.mining.show_worker_activity = flag == "1";
        }
    }
}

fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.quota.target_per_category, 60);
        assert_eq!(config.mining.shard_timeout_secs, 2700);
        assert_eq!(config.mining.max_retries, 3);
        assert_eq!(config.mining.split_after_retry, 2);
        assert_eq!(config.mining.sub_shards, 12);
        assert_eq!(config.mining.max_split_depth, 3);
        assert_eq!(config.mining.batch_size, 250);
        assert_eq!(config.planning.workers, 20);
        assert_eq!(config.planning.sharded_categories, vec![Category::Cpp]);
        assert_eq!(config.planning.default_start_year, 2000);
    }

    #[test]
    fn test_load_from_file_partial_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repominer.yml");
        fs::write(
            &path,
            r#"
quota:
  target_per_category: 10
  categories: ["Java", "C++"]
mining:
  sub_shards: 4
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.quota.target_per_category, 10);
        assert_eq!(config.quota.categories, vec![Category::Java, Category::Cpp]);
        assert_eq!(config.mining.sub_shards, 4);
        // Untouched sections keep defaults
        assert_eq!(config.mining.max_retries, 3);
        assert_eq!(config.github.org, "apache");
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let missing = PathBuf::from("/nonexistent/repominer.yml");
        assert!(Config::load_file_chain(Some(&missing)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[
            ("MAX_WORKERS", "8"),
            ("WORKER_TIMEOUT", "60"),
            ("BATCH_SIZE", "50"),
            ("TARGET_QUOTA", "5"),
            ("SHOW_WORKER_ACTIVITY", "1"),
        ]));

        assert_eq!(config.mining.max_workers, Some(8));
        assert_eq!(config.mining.shard_timeout_secs, 60);
        assert_eq!(config.mining.batch_size, 50);
        assert_eq!(config.quota.target_per_category, 5);
        assert!(config.mining.show_worker_activity);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[("MAX_WORKERS", "lots"), ("WORKER_TIMEOUT", "-1")]));
        assert_eq!(config.mining.max_workers, None);
        assert_eq!(config.mining.shard_timeout_secs, 2700);
    }

    #[test]
    fn test_effective_workers_capped_by_shards() {
        let mining = MiningConfig {
            max_workers: Some(16),
            ..Default::default()
        };
        assert_eq!(mining.effective_workers(3), 3);
        assert_eq!(mining.effective_workers(100), 16);
        assert_eq!(mining.effective_workers(0), 1);
    }
}
