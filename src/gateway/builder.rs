//! Builder for configuring generation clients

use std::sync::Arc;
use std::time::Duration;

use super::GenerationClient;
use crate::budget::{BudgetConfig, CostLedger, Pricing};
use crate::cache::{CacheConfig, ResponseCache};
use crate::limits::{ConcurrencyGate, RateLimitConfig, RateLimiter, gate::DEFAULT_MAX_IN_FLIGHT};
use crate::providers::{RemoteGenerator, RetryConfig};
use crate::{AbridgeError, Result};

/// Per-operation generation knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Hard deadline for one summary call. Default: 30s.
    pub summary_timeout: Duration,
    /// Hard deadline for one mindmap call. Default: 20s.
    pub mindmap_timeout: Duration,
    /// Default: 0.3.
    pub summary_temperature: f32,
    /// Default: 0.2.
    pub mindmap_temperature: f32,
    /// Used for mindmap retries after malformed or rejected output. Default: 0.0.
    pub strict_temperature: f32,
    /// Default: 1024.
    pub summary_max_tokens: u32,
    /// Default: 4096.
    pub mindmap_max_tokens: u32,
    /// Longer source text is truncated before prompting. Default: 100 000.
    pub max_source_chars: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            summary_timeout: Duration::from_secs(30),
            mindmap_timeout: Duration::from_secs(20),
            summary_temperature: 0.3,
            mindmap_temperature: 0.2,
            strict_temperature: 0.0,
            summary_max_tokens: 1024,
            mindmap_max_tokens: 4096,
            max_source_chars: 100_000,
        }
    }
}

/// Builder for [`GenerationClient`].
///
/// Components not supplied explicitly are created from their configs, so
/// a minimal client needs only a generator:
///
/// ```rust,ignore
/// let client = GenerationClient::builder()
///     .generator(GeminiGenerator::new(key, "gemini-1.5-flash")?)
///     .build()?;
/// ```
///
/// Shared components (`shared_cache`, `shared_ledger`, ...) let several
/// clients draw on one cache, one rate window and one budget.
pub struct GenerationClientBuilder {
    generator: Option<Arc<dyn RemoteGenerator>>,
    rate_limit: RateLimitConfig,
    max_in_flight: usize,
    cache_config: CacheConfig,
    retry: RetryConfig,
    pricing: Pricing,
    budget: BudgetConfig,
    settings: GenerationSettings,
    cache: Option<Arc<ResponseCache>>,
    limiter: Option<Arc<RateLimiter>>,
    gate: Option<ConcurrencyGate>,
    ledger: Option<Arc<CostLedger>>,
}

impl GenerationClientBuilder {
    pub fn new() -> Self {
        Self {
            generator: None,
            rate_limit: RateLimitConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cache_config: CacheConfig::default(),
            retry: RetryConfig::default(),
            pricing: Pricing::default(),
            budget: BudgetConfig::default(),
            settings: GenerationSettings::default(),
            cache: None,
            limiter: None,
            gate: None,
            ledger: None,
        }
    }

    /// Set the remote generation service.
    pub fn generator(mut self, generator: impl RemoteGenerator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Set an already shared remote generation service.
    pub fn shared_generator(mut self, generator: Arc<dyn RemoteGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Maximum simultaneous remote calls (minimum one).
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Set the retry policy. Use [`RetryConfig::disabled()`] for a single attempt.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Per-call deadlines for summaries and mindmaps.
    pub fn timeouts(mut self, summary: Duration, mindmap: Duration) -> Self {
        self.settings.summary_timeout = summary;
        self.settings.mindmap_timeout = mindmap;
        self
    }

    pub fn max_source_chars(mut self, n: usize) -> Self {
        self.settings.max_source_chars = n;
        self
    }

    /// Use an existing cache instead of creating one from [`cache()`](Self::cache).
    pub fn shared_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn shared_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn shared_gate(mut self, gate: ConcurrencyGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Use an existing ledger; its own pricing and budget take precedence.
    pub fn shared_ledger(mut self, ledger: Arc<CostLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GenerationClient> {
        let generator = self.generator.ok_or_else(|| {
            AbridgeError::Configuration("no remote generator configured".into())
        })?;
        if self.settings.max_source_chars == 0 {
            return Err(AbridgeError::Configuration(
                "max_source_chars must be positive".into(),
            ));
        }
        if self.settings.summary_timeout.is_zero() || self.settings.mindmap_timeout.is_zero() {
            return Err(AbridgeError::Configuration(
                "operation timeouts must be positive".into(),
            ));
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResponseCache::new(&self.cache_config)));
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.rate_limit)));
        let gate = self
            .gate
            .unwrap_or_else(|| ConcurrencyGate::new(self.max_in_flight));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(CostLedger::new(self.pricing, self.budget)));

        Ok(GenerationClient::new(
            generator,
            cache,
            limiter,
            gate,
            ledger,
            self.retry,
            self.settings,
        ))
    }
}

impl Default for GenerationClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
