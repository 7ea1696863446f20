use media_history_models::{Category, Listing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One request per minute
const MIN_REQUESTS_PER_SECOND: f64 = 1.0 / 60.0;

/// Each sampled title costs one credits request
pub const MAX_CAST_SAMPLE: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Metadata API access, pagination and retry tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Pages in flight at once (clamped to 1..=8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// Upper bound on pages per category (20 results per page)
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
    /// Release window is [run_date - lookback_days, run_date]
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Popularity feed to read (`discover`, `trending_day`, `trending_week`)
    #[serde(default)]
    pub listing: Listing,
    /// Top titles of a run whose cast is counted; 0 disables the cast export
    #[serde(default)]
    pub cast_sample: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Defaults to the data directory when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Also keep a dated copy of the canonical dataset per run
    #[serde(default)]
    pub snapshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default)]
    pub run_on_startup: bool,
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_requests_per_second() -> f64 {
    4.0
}

fn default_max_pages() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_rate_limit_backoff_ms() -> u64 {
    10_000
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}

fn default_lookback_days() -> u32 {
    180
}

fn default_schedule() -> String {
    "0 0 6 * * Mon".to_string() // Mondays 06:00
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: false,
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            concurrency: default_concurrency(),
            requests_per_second: default_requests_per_second(),
            max_pages: default_max_pages(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            lookback_days: default_lookback_days(),
            listing: Listing::default(),
            cast_sample: 0,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("api.base_url cannot be empty"));
        }
        if self.api.concurrency == 0 {
            return Err(anyhow::anyhow!("api.concurrency must be at least 1"));
        }
        let rps = self.api.requests_per_second;
        if !rps.is_finite() || rps < MIN_REQUESTS_PER_SECOND {
            return Err(anyhow::anyhow!(
                "api.requests_per_second must be a finite number of at least {:.4} (one per minute)",
                MIN_REQUESTS_PER_SECOND
            ));
        }
        if self.api.max_pages == 0 {
            return Err(anyhow::anyhow!("api.max_pages must be at least 1"));
        }
        if self.api.max_attempts == 0 {
            return Err(anyhow::anyhow!("api.max_attempts must be at least 1"));
        }
        if self.api.backoff_cap_ms < self.api.backoff_base_ms {
            return Err(anyhow::anyhow!("api.backoff_cap_ms must not be below api.backoff_base_ms"));
        }
        if self.pipeline.categories.is_empty() {
            return Err(anyhow::anyhow!("pipeline.categories cannot be empty"));
        }
        if self.pipeline.lookback_days == 0 {
            return Err(anyhow::anyhow!("pipeline.lookback_days must be at least 1"));
        }
        if self.pipeline.cast_sample > MAX_CAST_SAMPLE {
            return Err(anyhow::anyhow!(
                "pipeline.cast_sample must not exceed {}",
                MAX_CAST_SAMPLE
            ));
        }
        Ok(())
    }

    /// Categories in configured order with duplicates removed
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = Vec::new();
        for category in &self.pipeline.categories {
            if !seen.contains(category) {
                seen.push(*category);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.pipeline.categories = vec![Category::Tv];
        config.pipeline.lookback_days = 30;
        config.export.snapshots = true;

        config.save_to_file(file.path()).unwrap();

        let loaded = Config::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.pipeline.categories, vec![Category::Tv]);
        assert_eq!(loaded.pipeline.lookback_days, 30);
        assert!(loaded.export.snapshots);
        assert_eq!(loaded.api.max_attempts, 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            categories = ["movie"]
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.categories, vec![Category::Movie]);
        assert_eq!(config.pipeline.lookback_days, 180);
        assert_eq!(config.pipeline.listing, Listing::Discover);
        assert_eq!(config.pipeline.cast_sample, 0);
        assert_eq!(config.api.concurrency, 4);
        assert_eq!(config.api.base_url, "https://api.themoviedb.org/3");
        assert!(config.scheduler.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.pipeline.categories.clear();
        assert!(config.validate().is_err());

        config.pipeline.categories = vec![Category::Movie];
        config.api.concurrency = 0;
        assert!(config.validate().is_err());

        config.api.concurrency = 4;
        config.pipeline.lookback_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trending_listing_with_cast_sample() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            listing = "trending_week"
            cast_sample = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.listing, Listing::TrendingWeek);
        assert_eq!(config.pipeline.cast_sample, 8);
        assert!(config.validate().is_ok());

        let mut config = config;
        config.pipeline.cast_sample = MAX_CAST_SAMPLE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_request_rate_bounds() {
        let mut config = Config::default();
        for rps in [0.0, -1.0, 1e-20, f64::NAN, f64::INFINITY] {
            config.api.requests_per_second = rps;
            assert!(config.validate().is_err(), "{rps} should be rejected");
        }

        config.api.requests_per_second = 1.0 / 60.0;
        assert!(config.validate().is_ok());
        config.api.requests_per_second = 40.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_categories_deduplicated() {
        let mut config = Config::default();
        config.pipeline.categories = vec![Category::Tv, Category::Movie, Category::Tv];
        assert_eq!(config.categories(), vec![Category::Tv, Category::Movie]);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.pipeline.categories, Category::ALL.to_vec());
    }
}
