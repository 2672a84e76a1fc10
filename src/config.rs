//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (explicit)
//! 2. `~/.abridge/config.toml` (user)
//! 3. `/etc/abridge/config.toml` (system)
//! 4. built-in defaults
//!
//! The API key never lives in the config file. It is read from
//! `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`. With `[gemini] mock`
//! set no key is needed and responses are canned.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::budget::{BudgetConfig, Pricing};
use crate::cache::CacheConfig;
use crate::gateway::{GenerationClientBuilder, GenerationSettings};
use crate::limits::RateLimitConfig;
use crate::providers::{MockGenerator, RemoteGenerator, RetryConfig};
use crate::{AbridgeError, Result};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub concurrency: ConcurrencySection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

/// Remote service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// Model name (default: gemini-1.5-flash).
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL (default: https://generativelanguage.googleapis.com).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Serve canned responses instead of calling the API (default: false).
    #[serde(default)]
    pub mock: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            mock: false,
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Requests per window (default: 60).
    #[serde(default = "default_requests")]
    pub requests: u32,
    /// Window length in seconds (default: 60).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencySection {
    /// Simultaneous remote calls (default: 3).
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_max_in_flight() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Capacity in megabytes (default: 1024).
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// Entry lifetime in seconds; 0 disables expiry (default: 0).
    #[serde(default)]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            ttl_secs: 0,
        }
    }
}

fn default_max_size_mb() -> u64 {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Retries after the first attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_base: default_backoff_base(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_base() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSection {
    /// Daily spend ceiling in USD (default: 10).
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: Decimal,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit(),
        }
    }
}

fn default_daily_limit() -> Decimal {
    BudgetConfig::default().daily_limit_usd
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_summary_secs")]
    pub summary_secs: u64,
    #[serde(default = "default_mindmap_secs")]
    pub mindmap_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            summary_secs: default_summary_secs(),
            mindmap_secs: default_mindmap_secs(),
        }
    }
}

fn default_summary_secs() -> u64 {
    30
}

fn default_mindmap_secs() -> u64 {
    20
}

/// Prompt-level knobs. Unset fields keep [`GenerationSettings`] defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationSection {
    pub summary_temperature: Option<f32>,
    pub mindmap_temperature: Option<f32>,
    pub summary_max_tokens: Option<u32>,
    pub mindmap_max_tokens: Option<u32>,
    pub max_source_chars: Option<usize>,
}

impl Config {
    /// Load configuration from the standard locations, falling back to
    /// defaults when no file exists.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            AbridgeError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            AbridgeError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(AbridgeError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".abridge").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/abridge/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AbridgeError::Configuration(msg.to_string()));

        if self.rate_limit.requests == 0 || self.rate_limit.window_secs == 0 {
            return invalid("rate_limit.requests and rate_limit.window_secs must be positive");
        }
        if self.concurrency.max_in_flight == 0 {
            return invalid("concurrency.max_in_flight must be positive");
        }
        if self.cache.max_size_mb == 0 {
            return invalid("cache.max_size_mb must be positive");
        }
        if self.retry.backoff_base < 1 {
            return invalid("retry.backoff_base must be at least 1");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return invalid("retry.max_delay_ms must not be below retry.initial_delay_ms");
        }
        if self.pricing.input_per_token.is_sign_negative()
            || self.pricing.output_per_token.is_sign_negative()
        {
            return invalid("pricing must not be negative");
        }
        if self.budget.daily_limit_usd.is_sign_negative() {
            return invalid("budget.daily_limit_usd must not be negative");
        }
        if self.timeouts.summary_secs == 0 || self.timeouts.mindmap_secs == 0 {
            return invalid("timeouts must be positive");
        }
        if self.generation.max_source_chars == Some(0) {
            return invalid("generation.max_source_chars must be positive");
        }
        Ok(())
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit.requests,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }

    pub fn cache_config(&self) -> CacheConfig {
        let bytes = self.cache.max_size_mb.saturating_mul(1024 * 1024);
        let config = CacheConfig::new().capacity_bytes(bytes);
        match self.cache.ttl_secs {
            0 => config,
            secs => config.ttl(Duration::from_secs(secs)),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .backoff_base(self.retry.backoff_base)
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(self.retry.jitter)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        let defaults = GenerationSettings::default();
        let g = &self.generation;
        GenerationSettings {
            summary_timeout: Duration::from_secs(self.timeouts.summary_secs),
            mindmap_timeout: Duration::from_secs(self.timeouts.mindmap_secs),
            summary_temperature: g.summary_temperature.unwrap_or(defaults.summary_temperature),
            mindmap_temperature: g.mindmap_temperature.unwrap_or(defaults.mindmap_temperature),
            summary_max_tokens: g.summary_max_tokens.unwrap_or(defaults.summary_max_tokens),
            mindmap_max_tokens: g.mindmap_max_tokens.unwrap_or(defaults.mindmap_max_tokens),
            max_source_chars: g.max_source_chars.unwrap_or(defaults.max_source_chars),
            ..defaults
        }
    }

    /// A client builder with every configured component applied. Only
    /// the generator is left for the caller to set.
    pub fn client_builder(&self) -> GenerationClientBuilder {
        GenerationClientBuilder::new()
            .rate_limit(self.rate_limit_config())
            .max_in_flight(self.concurrency.max_in_flight)
            .cache(self.cache_config())
            .retry(self.retry_config())
            .pricing(self.pricing)
            .budget(BudgetConfig::daily_limit(self.budget.daily_limit_usd))
            .settings(self.generation_settings())
    }

    /// The configured remote generator: canned output when `[gemini] mock`
    /// is set, otherwise the Gemini client.
    pub fn remote_generator(&self) -> Result<Arc<dyn RemoteGenerator>> {
        if self.gemini.mock {
            warn!("gemini mock mode: responses are canned and nothing is sent");
            return Ok(Arc::new(MockGenerator::new()));
        }
        #[cfg(feature = "gemini")]
        {
            Ok(Arc::new(self.gemini_generator()?))
        }
        #[cfg(not(feature = "gemini"))]
        {
            Err(AbridgeError::Configuration(
                "built without the gemini feature; set [gemini] mock = true".into(),
            ))
        }
    }

    /// Build a Gemini generator from `[gemini]` and the API key environment.
    #[cfg(feature = "gemini")]
    pub fn gemini_generator(&self) -> Result<crate::providers::GeminiGenerator> {
        let key = api_key_from_env().ok_or_else(|| {
            AbridgeError::Configuration(format!(
                "no API key: set one of {}",
                API_KEY_ENV_VARS.join(", ")
            ))
        })?;
        crate::providers::GeminiGenerator::with_base_url(
            key,
            &self.gemini.model,
            &self.gemini.base_url,
        )
    }
}

/// First non-empty API key among [`API_KEY_ENV_VARS`].
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|key| !key.trim().is_empty())
}
