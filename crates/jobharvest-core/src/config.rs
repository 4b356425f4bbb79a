//! Harvest configuration.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. A `HarvestingConfiguration` is built once
//! per run, validated, and treated as read-only afterwards.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{JobField, Region};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Complete parameter bag for one harvest run.
///
/// Loaded from `~/.config/jobharvest/config.toml` (or platform equivalent)
/// when no explicit path is given. Missing sections use defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestingConfiguration {
    /// Target region; selects the base domain
    pub region: Region,
    /// Request pacing
    pub pacing: PacingConfig,
    /// Client identity rotation
    pub identity: IdentityConfig,
    /// HTTP fetch and retry behaviour
    pub fetch: FetchConfig,
    /// Secondary browser fetch path; window size comes from the identity
    pub browser: BrowserConfig,
    /// Which fields to attempt
    pub extraction: ExtractionConfig,
    /// Rejection rules and scoring weights
    pub validation: ValidationConfig,
    /// Pagination, concurrency and failure policy
    pub orchestration: OrchestrationConfig,
}

impl HarvestingConfiguration {
    /// Load configuration from the default path, falling back to defaults if not found.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file. The file must exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of `self`.
    ///
    /// Supports the following environment variables:
    /// - `JOBHARVEST_REGION`: region code (US, UK, DE, ...)
    /// - `JOBHARVEST_MIN_DELAY_MS` / `JOBHARVEST_MAX_DELAY_MS`: pacing bounds
    /// - `JOBHARVEST_MAX_ATTEMPTS`: fetch attempt ceiling
    /// - `JOBHARVEST_TIMEOUT_SECS`: request timeout
    /// - `JOBHARVEST_HEADLESS`: browser headless mode (true/false)
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("JOBHARVEST_REGION") {
            if let Ok(region) = val.parse() {
                self.region = region;
                tracing::debug!("Override region from env: {}", region);
            }
        }

        if let Some(ms) = env_parse("JOBHARVEST_MIN_DELAY_MS") {
            self.pacing.min_delay_ms = ms;
            tracing::debug!("Override pacing.min_delay_ms from env: {}", ms);
        }

        if let Some(ms) = env_parse("JOBHARVEST_MAX_DELAY_MS") {
            self.pacing.max_delay_ms = ms;
            tracing::debug!("Override pacing.max_delay_ms from env: {}", ms);
        }

        if let Some(attempts) = env_parse("JOBHARVEST_MAX_ATTEMPTS") {
            self.fetch.max_attempts = attempts;
            tracing::debug!("Override fetch.max_attempts from env: {}", attempts);
        }

        if let Some(secs) = env_parse("JOBHARVEST_TIMEOUT_SECS") {
            self.fetch.timeout_secs = secs;
            tracing::debug!("Override fetch.timeout_secs from env: {}", secs);
        }

        if let Some(headless) = env_parse("JOBHARVEST_HEADLESS") {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        self
    }

    /// Load from `path` (or the default location) and apply environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        Ok(config.with_env_overrides())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path
            .parent()
            .ok_or_else(|| ConfigError::invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the path to the default configuration file.
    ///
    /// Uses XDG base directories: `~/.config/jobharvest/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "jobharvest", "jobharvest").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check that all bounds are sane. Downstream components assume this passed.
    pub fn validate(&self) -> ConfigResult<()> {
        let p = &self.pacing;
        if p.min_delay_ms > p.max_delay_ms {
            return Err(ConfigError::invalid(
                "pacing.min_delay_ms",
                format!("{} exceeds max_delay_ms {}", p.min_delay_ms, p.max_delay_ms),
            ));
        }
        if p.break_min_ms > p.break_max_ms {
            return Err(ConfigError::invalid(
                "pacing.break_min_ms",
                format!("{} exceeds break_max_ms {}", p.break_min_ms, p.break_max_ms),
            ));
        }
        if p.block_cooldown_min_ms > p.block_cooldown_max_ms {
            return Err(ConfigError::invalid(
                "pacing.block_cooldown_min_ms",
                format!(
                    "{} exceeds block_cooldown_max_ms {}",
                    p.block_cooldown_min_ms, p.block_cooldown_max_ms
                ),
            ));
        }
        if p.reading_min_ms > p.reading_max_ms {
            return Err(ConfigError::invalid(
                "pacing.reading_min_ms",
                format!("{} exceeds reading_max_ms {}", p.reading_min_ms, p.reading_max_ms),
            ));
        }
        if !(0.0..=1.0).contains(&p.human_variance_factor) {
            return Err(ConfigError::invalid(
                "pacing.human_variance_factor",
                "must be within [0, 1]",
            ));
        }
        if self.identity.rotation_frequency == 0 {
            return Err(ConfigError::invalid(
                "identity.rotation_frequency",
                "must be at least 1",
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::invalid("fetch.max_attempts", "must be at least 1"));
        }
        if self.fetch.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "fetch.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if self.orchestration.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "orchestration.max_concurrent_requests",
                "must be at least 1",
            ));
        }
        if self.orchestration.page_size == 0 {
            return Err(ConfigError::invalid("orchestration.page_size", "must be at least 1"));
        }
        if !self.fetch.primary_enabled && !self.fetch.browser_fallback {
            return Err(ConfigError::invalid(
                "fetch.primary_enabled",
                "at least one fetch path must be enabled",
            ));
        }
        self.validation.scoring.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Request pacing bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Lower bound of a regular inter-request delay
    pub min_delay_ms: u64,
    /// Upper bound of a regular inter-request delay
    pub max_delay_ms: u64,
    /// Relative jitter applied before clamping (0.3 = ±30%)
    pub human_variance_factor: f64,
    /// Take a rest break every this many requests (0 = never)
    pub break_every: u64,
    /// Lower bound of a rest break
    pub break_min_ms: u64,
    /// Upper bound of a rest break
    pub break_max_ms: u64,
    /// Lower bound of the cool-off after a blocked page is skipped
    pub block_cooldown_min_ms: u64,
    /// Upper bound of the cool-off after a blocked page is skipped
    pub block_cooldown_max_ms: u64,
    /// Assumed reading speed for the post-page reading pause (0 = no pause)
    pub reading_words_per_minute: u64,
    /// Shortest reading pause
    pub reading_min_ms: u64,
    /// Longest reading pause
    pub reading_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 3_000,
            max_delay_ms: 8_000,
            human_variance_factor: 0.3,
            break_every: 20,
            break_min_ms: 30_000,
            break_max_ms: 90_000,
            block_cooldown_min_ms: 180_000,
            block_cooldown_max_ms: 420_000,
            reading_words_per_minute: 200,
            reading_min_ms: 2_000,
            reading_max_ms: 15_000,
        }
    }
}

/// Client identity rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Rotate to the next identity every this many requests
    pub rotation_frequency: u64,
    /// Force a fresh identity after this many requests (0 = never)
    pub max_requests_per_session: u64,
    /// `accept-language` values mixed into the profile pool
    pub languages: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            rotation_frequency: 12,
            max_requests_per_session: 75,
            languages: ["en-US", "en-GB", "en-CA", "en-AU", "es-ES", "fr-FR", "de-DE", "it-IT"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// HTTP fetch and retry behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempt ceiling per page, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff_base_ms: u64,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
    /// Cap on any single backoff wait
    pub max_backoff_ms: u64,
    /// Whether the plain HTTP path is used at all
    pub primary_enabled: bool,
    /// Whether the browser path may serve pages
    pub browser_fallback: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 120_000,
            primary_enabled: true,
            browser_fallback: false,
        }
    }
}

/// Browser automation settings for the secondary fetch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Selector that signals the listing content has rendered
    pub ready_selector: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 30,
            ready_selector: Some("div.base-card, div.job-search-card".to_string()),
        }
    }
}

/// Which extended fields the extraction pipeline attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extended fields to attempt; core fields are always attempted
    pub extended_fields: Vec<JobField>,
}

impl ExtractionConfig {
    /// Whether `field` is attempted at all.
    #[must_use]
    pub fn attempts(&self, field: JobField) -> bool {
        field.is_core() || self.extended_fields.contains(&field)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extended_fields: JobField::EXTENDED.to_vec(),
        }
    }
}

/// Rejection rules and scoring policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Titles shorter than this are rejected as garbage
    pub min_title_length: usize,
    /// Titles longer than this are truncated
    pub max_title_length: usize,
    /// Company names shorter than this are rejected
    pub min_company_length: usize,
    /// Whether banned-token matching runs
    pub spam_detection_enabled: bool,
    /// Case-insensitive tokens that mark a title as spam
    pub banned_title_tokens: Vec<String>,
    /// Field weights for the quality score
    pub scoring: ScoringWeights,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_title_length: 3,
            max_title_length: 200,
            min_company_length: 2,
            spam_detection_enabled: true,
            banned_title_tokens: [
                "\u{1f680}",
                "\u{1f4b0}",
                "\u{1f525}",
                "\u{1f4af}",
                "URGENT",
                "IMMEDIATE",
                "HURRY",
                "MAKE MONEY FAST",
                "WORK FROM HOME GUARANTEED",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            scoring: ScoringWeights::default(),
        }
    }
}

/// Weights of the per-field indicators in the quality score.
///
/// A field's weight is its entry in `overrides` (keyed by field name) or
/// else `core_weight`/`extended_weight` depending on the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of title, company, location, source URL and posted date
    pub core_weight: f64,
    /// Weight of every other field
    pub extended_weight: f64,
    /// Per-field weights by snake_case field name
    pub overrides: BTreeMap<String, f64>,
}

impl ScoringWeights {
    /// Weight of a single field.
    #[must_use]
    pub fn weight(&self, field: JobField) -> f64 {
        self.overrides
            .get(field.as_str())
            .copied()
            .unwrap_or(if field.is_core() {
                self.core_weight
            } else {
                self.extended_weight
            })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.core_weight < 0.0 || self.extended_weight < 0.0 {
            return Err(ConfigError::invalid(
                "validation.scoring",
                "weights must be non-negative",
            ));
        }
        for (name, weight) in &self.overrides {
            if !JobField::ALL.iter().any(|f| f.as_str() == name) {
                return Err(ConfigError::invalid(
                    "validation.scoring.overrides",
                    format!("unknown field '{name}'"),
                ));
            }
            if *weight < 0.0 {
                return Err(ConfigError::invalid(
                    "validation.scoring.overrides",
                    format!("weight for '{name}' must be non-negative"),
                ));
            }
        }
        let total: f64 = JobField::ALL.iter().map(|f| self.weight(*f)).sum();
        if total <= 0.0 {
            return Err(ConfigError::invalid(
                "validation.scoring",
                "weights must have a positive sum",
            ));
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            core_weight: 2.0,
            extended_weight: 1.0,
            overrides: BTreeMap::new(),
        }
    }
}

/// Pagination, concurrency and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Upper bound on simultaneous page fetches
    pub max_concurrent_requests: usize,
    /// Listings per result page; page `n` starts at `n * page_size`
    pub page_size: u32,
    /// Abort the run on a blocked page instead of skipping it
    pub abort_on_block: bool,
    /// Stop scheduling after this many consecutive failed pages (0 = never)
    pub max_consecutive_page_failures: u32,
    /// Whether duplicates are merged before the report is emitted
    pub remove_duplicates: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 3,
            page_size: 25,
            abort_on_block: true,
            max_consecutive_page_failures: 3,
            remove_duplicates: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HarvestingConfiguration::default();
        assert_eq!(config.region, Region::Us);
        assert_eq!(config.pacing.min_delay_ms, 3_000);
        assert_eq!(config.fetch.max_attempts, 3);
        assert!(config.orchestration.abort_on_block);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = HarvestingConfiguration::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[pacing]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("[validation.scoring]"));

        let parsed: HarvestingConfiguration =
            toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.pacing.max_delay_ms, config.pacing.max_delay_ms);
        assert_eq!(
            parsed.extraction.extended_fields,
            config.extraction.extended_fields
        );
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = HarvestingConfiguration::default();
        config.region = Region::De;
        config.pacing.min_delay_ms = 1_000;
        config.save_to(&config_path).expect("save config");

        let loaded = HarvestingConfiguration::load_from(&config_path).expect("load config");
        assert_eq!(loaded.region, Region::De);
        assert_eq!(loaded.pacing.min_delay_ms, 1_000);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let err = HarvestingConfiguration::load_from(&tmp.path().join("absent.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
region = "UK"

[pacing]
min_delay_ms = 2000
max_delay_ms = 5000

[extraction]
extended_fields = ["salary_info", "description"]

[validation.scoring.overrides]
salary_info = 0.5
"#;

        let config: HarvestingConfiguration =
            toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.region, Region::Uk);
        assert_eq!(config.pacing.max_delay_ms, 5_000);
        // Untouched fields keep defaults
        assert_eq!(config.pacing.break_every, 20);
        assert_eq!(config.fetch.max_attempts, 3);
        assert!(config.extraction.attempts(JobField::SalaryInfo));
        assert!(config.extraction.attempts(JobField::Title));
        assert!(!config.extraction.attempts(JobField::Benefits));
        assert!((config.validation.scoring.weight(JobField::SalaryInfo) - 0.5).abs() < f64::EPSILON);
        assert!((config.validation.scoring.weight(JobField::Title) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = HarvestingConfiguration::default();
        config.pacing.min_delay_ms = 10_000;
        config.pacing.max_delay_ms = 5_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = HarvestingConfiguration::default();
        config.pacing.block_cooldown_min_ms = 500_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "pacing.block_cooldown_min_ms"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = HarvestingConfiguration::default();
        config
            .validation
            .scoring
            .overrides
            .insert("shoe_size".to_string(), 1.0);
        assert!(config.validate().is_err());

        let mut config = HarvestingConfiguration::default();
        config.validation.scoring.core_weight = 0.0;
        config.validation.scoring.extended_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_a_fetch_path() {
        let mut config = HarvestingConfiguration::default();
        config.fetch.primary_enabled = false;
        config.fetch.browser_fallback = false;
        assert!(config.validate().is_err());
    }
}
