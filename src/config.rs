//! Runtime configuration for formseed.
//!
//! All tunables of the pipeline (retry budgets, backoff parameters, readiness
//! polling, concurrency, file locations) live here with their defaults. Every
//! value can be overridden through a `FORMSEED_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Where the platform lives and how to reach its API.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL of the running platform.
    pub base_url: String,
    /// Path prefix of the management API.
    pub api_prefix: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_prefix: "/api/v1/management".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Capped exponential backoff with full jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay, including `Retry-After` hints.
    pub max_delay: Duration,
    /// Randomize each delay in `[0, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Container set and readiness probing.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Directory holding the platform checkout and its compose file.
    pub project_dir: PathBuf,
    /// Repository cloned into `project_dir` when it does not exist.
    pub repo_url: String,
    /// Compose file name inside `project_dir`.
    pub compose_file: String,
    /// Readiness endpoint, relative to the platform base URL.
    pub health_path: String,
    /// Timeout of a single readiness probe.
    pub probe_timeout: Duration,
    /// First delay between probes.
    pub initial_poll_interval: Duration,
    /// Cap on the delay between probes.
    pub max_poll_interval: Duration,
    /// Give up after this long and tear the containers down again.
    pub max_wait: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("formbricks"),
            repo_url: "https://github.com/formbricks/formbricks.git".to_string(),
            compose_file: "docker-compose.yml".to_string(),
            health_path: "/api/health".to_string(),
            probe_timeout: Duration::from_secs(5),
            initial_poll_interval: Duration::from_secs(5),
            max_poll_interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// LLM data generation settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Token budget of one completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Clarifying re-prompts allowed after the first unparseable answer.
    pub max_parse_retries: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
            max_parse_retries: 3,
        }
    }
}

/// Seeding run settings.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Maximum simultaneous outbound creation requests.
    pub concurrency: usize,
    /// Generated data file written by `generate` and read by `seed`.
    pub data_file: PathBuf,
    /// SQLite file holding the seeding state.
    pub state_db: PathBuf,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            data_file: PathBuf::from("generated_data.json"),
            state_db: PathBuf::from("seed_state.db"),
        }
    }
}

/// Complete configuration of the tool.
#[derive(Debug, Clone, Default)]
pub struct SeederConfig {
    pub platform: PlatformConfig,
    pub retry: RetryPolicy,
    pub lifecycle: LifecycleConfig,
    pub generator: GeneratorConfig,
    pub seed: SeedConfig,
}

impl SeederConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORMSEED_BASE_URL`: Platform base URL (default: http://localhost:3000)
    /// - `FORMSEED_API_PREFIX`: Management API prefix (default: /api/v1/management)
    /// - `FORMSEED_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 30)
    /// - `FORMSEED_RETRY_MAX_ATTEMPTS`: Attempts per API request (default: 4)
    /// - `FORMSEED_RETRY_BASE_MS`: First retry delay (default: 500)
    /// - `FORMSEED_RETRY_MAX_MS`: Retry delay cap (default: 30000)
    /// - `FORMSEED_PROJECT_DIR`: Platform checkout directory (default: formbricks)
    /// - `FORMSEED_REPO_URL`: Repository cloned on `up`
    /// - `FORMSEED_HEALTH_PATH`: Readiness endpoint (default: /api/health)
    /// - `FORMSEED_POLL_INITIAL_SECS`: First readiness delay (default: 5)
    /// - `FORMSEED_POLL_MAX_SECS`: Readiness delay cap (default: 60)
    /// - `FORMSEED_MAX_WAIT_SECS`: Startup deadline (default: 600)
    /// - `FORMSEED_MODEL`: LLM model (default: gpt-4)
    /// - `FORMSEED_MAX_TOKENS`: Completion token budget (default: 4000)
    /// - `FORMSEED_PARSE_RETRIES`: Clarifying re-prompts (default: 3)
    /// - `FORMSEED_CONCURRENCY`: Simultaneous creation requests (default: 5)
    /// - `FORMSEED_DATA_FILE`: Generated data file (default: generated_data.json)
    /// - `FORMSEED_STATE_DB`: Seeding state database (default: seed_state.db)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FORMSEED_BASE_URL") {
            config.platform.base_url = val.trim_end_matches('/').to_string();
        }
        if let Ok(val) = std::env::var("FORMSEED_API_PREFIX") {
            config.platform.api_prefix = val;
        }
        if let Ok(val) = std::env::var("FORMSEED_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORMSEED_REQUEST_TIMEOUT_SECS")?;
            config.platform.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("FORMSEED_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env_value(&val, "FORMSEED_RETRY_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("FORMSEED_RETRY_BASE_MS") {
            let ms: u64 = parse_env_value(&val, "FORMSEED_RETRY_BASE_MS")?;
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Ok(val) = std::env::var("FORMSEED_RETRY_MAX_MS") {
            let ms: u64 = parse_env_value(&val, "FORMSEED_RETRY_MAX_MS")?;
            config.retry.max_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("FORMSEED_PROJECT_DIR") {
            config.lifecycle.project_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FORMSEED_REPO_URL") {
            config.lifecycle.repo_url = val;
        }
        if let Ok(val) = std::env::var("FORMSEED_HEALTH_PATH") {
            config.lifecycle.health_path = val;
        }
        if let Ok(val) = std::env::var("FORMSEED_POLL_INITIAL_SECS") {
            let secs: u64 = parse_env_value(&val, "FORMSEED_POLL_INITIAL_SECS")?;
            config.lifecycle.initial_poll_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("FORMSEED_POLL_MAX_SECS") {
            let secs: u64 = parse_env_value(&val, "FORMSEED_POLL_MAX_SECS")?;
            config.lifecycle.max_poll_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("FORMSEED_MAX_WAIT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORMSEED_MAX_WAIT_SECS")?;
            config.lifecycle.max_wait = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("FORMSEED_MODEL") {
            config.generator.model = val;
        }
        if let Ok(val) = std::env::var("FORMSEED_MAX_TOKENS") {
            config.generator.max_tokens = parse_env_value(&val, "FORMSEED_MAX_TOKENS")?;
        }
        if let Ok(val) = std::env::var("FORMSEED_PARSE_RETRIES") {
            config.generator.max_parse_retries = parse_env_value(&val, "FORMSEED_PARSE_RETRIES")?;
        }

        if let Ok(val) = std::env::var("FORMSEED_CONCURRENCY") {
            config.seed.concurrency = parse_env_value(&val, "FORMSEED_CONCURRENCY")?;
        }
        if let Ok(val) = std::env::var("FORMSEED_DATA_FILE") {
            config.seed.data_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FORMSEED_STATE_DB") {
            config.seed.state_db = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.base_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "base_url cannot be empty".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::ValidationFailed(
                "retry base_delay must not exceed max_delay".to_string(),
            ));
        }

        if self.lifecycle.initial_poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "initial_poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.initial_poll_interval > self.lifecycle.max_poll_interval {
            return Err(ConfigError::ValidationFailed(
                "initial_poll_interval must not exceed max_poll_interval".to_string(),
            ));
        }

        if self.lifecycle.max_wait.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "max_wait must be greater than 0".to_string(),
            ));
        }

        if self.generator.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.seed.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value into the requested type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
