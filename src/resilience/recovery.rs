//! Error recovery for dependency failures.
//!
//! This module provides:
//! - Retry utilities with exponential backoff and jitter
//! - [`ErrorRecoveryService`], which runs the strategy the classifier picks
//! - Proactive health checks over the store, host and breakers

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RsError};
use crate::resilience::classifier::{Classification, ErrorClassifier, RecoveryStrategy};
use crate::resilience::context::{DegradedMode, ErrorContext, RecoveryHistory};
use crate::resilience::health::{self, HealthCheck, HealthProbe, HealthThresholds};
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::storage::KeyValueStore;
use crate::utils::clock::Clock;

/// Namespace for persisted per-dependency recovery history.
pub const HISTORY_NAMESPACE: &str = "recovery_history";

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Maximum delay cap.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0-1.0) to spread out synchronized retries.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = Duration::from_millis(self.initial_delay_ms).as_secs_f64()
            * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(Duration::from_millis(self.max_delay_ms).as_secs_f64());

        // Deterministic jitter based on attempt number
        let jitter = if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter_offset = (f64::from(attempt) * 0.618_033_988_749_895) % 1.0;
            jitter_range * (jitter_offset - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_secs_f64((capped_delay + jitter).max(0.0))
    }
}

/// Execute a fallible operation with retries, sleeping on `clock` between
/// attempts. Errors for which `should_retry` is false are returned at once.
pub fn with_retry_if<T, F, C>(clock: &dyn Clock, config: &RetryConfig, mut operation: F, should_retry: C) -> Result<T>
where
    F: FnMut() -> Result<T>,
    C: Fn(&RsError) -> bool,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts || !should_retry(&err) => return Err(err),
            Err(err) => {
                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                clock.sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Retry recoverable errors.
pub fn with_retry<T, F>(clock: &dyn Clock, config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_retry_if(clock, config, operation, |err| err.code().is_recoverable())
}

/// Recovery service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub retry: RetryConfig,
    /// Backoff base when a rate-limited error carries no retry hint.
    pub default_retry_after_ms: u64,
    /// Cap on rate-limit backoff.
    pub max_backoff_secs: u64,
    pub health: HealthThresholds,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_retry_after_ms: 1_000,
            max_backoff_secs: 60,
            health: HealthThresholds::default(),
        }
    }
}

/// Recreates the database connection after a connectivity failure.
pub trait Reconnect: Send + Sync {
    fn reconnect(&self) -> Result<()>;
}

impl<F> Reconnect for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn reconnect(&self) -> Result<()> {
        self()
    }
}

/// What a recovery attempt did.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    pub classification: Classification,
    pub recovered: bool,
    pub action: String,
}

/// Runs recovery strategies and health checks.
pub struct ErrorRecoveryService {
    classifier: ErrorClassifier,
    config: RecoveryConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    registry: Option<Arc<CircuitBreakerRegistry>>,
    reconnect: Option<Arc<dyn Reconnect>>,
    probes: Vec<Arc<dyn HealthProbe>>,
    data_dir: Option<PathBuf>,
    rate_limit_hits: Mutex<HashMap<String, u32>>,
}

impl std::fmt::Debug for ErrorRecoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecoveryService")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .field("has_reconnect", &self.reconnect.is_some())
            .field("probes", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl ErrorRecoveryService {
    pub fn new(
        classifier: ErrorClassifier,
        config: RecoveryConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            config,
            clock,
            store,
            registry: None,
            reconnect: None,
            probes: Vec::new(),
            data_dir: None,
            rate_limit_hits: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: Arc<dyn Reconnect>) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Directory whose filesystem the disk check inspects.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Try to recover from `error`. Never fails: a strategy that cannot run
    /// or whose action errors reports `false`.
    pub fn attempt_recovery(&self, error: &RsError, context: &mut ErrorContext) -> bool {
        self.recover(error, context).recovered
    }

    /// Like [`attempt_recovery`](Self::attempt_recovery), returning the
    /// classification and the action taken.
    pub fn recover(&self, error: &RsError, context: &mut ErrorContext) -> RecoveryOutcome {
        let started = self.clock.now();
        let dependency = error
            .dependency()
            .map(ToString::to_string)
            .or_else(|| context.dependency.clone());
        if context.recovery_history.is_none() {
            if let Some(dep) = dependency.as_deref() {
                context.recovery_history = Some(self.history(dep));
            }
        }

        let classification = self.classifier.classify(error, context);
        let (recovered, action) = match classification.recovery_strategy {
            RecoveryStrategy::ReconnectDatabase => self.reconnect_database(),
            RecoveryStrategy::RateLimitBackoff => self.rate_limit_backoff(error, context, dependency.as_deref()),
            RecoveryStrategy::BatchSizeReduction => self.reduce_batch_size(context),
            RecoveryStrategy::CircuitBreakerFallback | RecoveryStrategy::GracefulFallback => {
                Self::degrade(context)
            }
            RecoveryStrategy::Retry => self.retry_delay(context),
            RecoveryStrategy::None => (false, "no recovery available".to_string()),
        };

        let took = (self.clock.now() - started).to_std().unwrap_or_default();
        if let Some(dep) = dependency.as_deref() {
            self.record_history(dep, recovered, took);
        }

        tracing::info!(
            code = %classification.error_code,
            dependency = dependency.as_deref().unwrap_or("-"),
            strategy = classification.recovery_strategy.as_str(),
            recovered,
            action = %action,
            "recovery attempted"
        );

        RecoveryOutcome {
            classification,
            recovered,
            action,
        }
    }

    fn reconnect_database(&self) -> (bool, String) {
        let Some(reconnect) = &self.reconnect else {
            tracing::warn!("database reconnect requested but no reconnect hook is registered");
            return (false, "no reconnect hook registered".to_string());
        };
        match reconnect.reconnect() {
            Ok(()) => (true, "database connection recreated".to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "database reconnect failed");
                (false, format!("reconnect failed ({})", err.code()))
            }
        }
    }

    /// Delay for the current rate-limit hit: base × 2^(hits-1), capped.
    pub fn rate_limit_delay(&self, base: Duration, hits: u32) -> Duration {
        let factor = 2u32.saturating_pow(hits.saturating_sub(1));
        base.saturating_mul(factor)
            .min(Duration::from_secs(self.config.max_backoff_secs))
    }

    fn rate_limit_backoff(&self, error: &RsError, context: &ErrorContext, dependency: Option<&str>) -> (bool, String) {
        let key = dependency.unwrap_or("general").to_string();
        let hits = {
            let mut hits = self.rate_limit_hits.lock();
            let entry = hits.entry(key).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        let base = context
            .retry_after
            .or_else(|| error.retry_after())
            .unwrap_or_else(|| Duration::from_millis(self.config.default_retry_after_ms));
        let delay = self.rate_limit_delay(base, hits);
        self.clock.sleep(delay);
        (true, format!("backed off {}ms (hit {hits})", delay.as_millis()))
    }

    /// Current rate-limit hit count for a dependency.
    pub fn rate_limit_hits(&self, dependency: &str) -> u32 {
        self.rate_limit_hits.lock().get(dependency).copied().unwrap_or(0)
    }

    fn reduce_batch_size(&self, context: &mut ErrorContext) -> (bool, String) {
        let floor = self.classifier.config().min_batch_size.max(1);
        match context.batch_size {
            Some(size) if self.classifier.can_halve(Some(size)) => {
                let reduced = (size / 2).max(floor);
                context.batch_size = Some(reduced);
                (true, format!("batch size reduced {size} -> {reduced}"))
            }
            Some(size) => (false, format!("batch size {size} already at minimum")),
            None => (false, "no batch size to reduce".to_string()),
        }
    }

    fn degrade(context: &mut ErrorContext) -> (bool, String) {
        let mode = if context.has_last_known_good {
            DegradedMode::LastKnownGood
        } else {
            DegradedMode::LexicalOnly
        };
        context.degraded_mode = Some(mode);
        let action = match mode {
            DegradedMode::LastKnownGood => "serving last known good results",
            DegradedMode::LexicalOnly => "serving keyword-only results",
        };
        (true, action.to_string())
    }

    fn retry_delay(&self, context: &ErrorContext) -> (bool, String) {
        if context.attempt + 1 >= self.config.retry.max_attempts.max(1) {
            return (false, format!("retry budget exhausted after {} attempts", context.attempt + 1));
        }
        let delay = self.config.retry.delay_for_attempt(context.attempt);
        self.clock.sleep(delay);
        (true, format!("waited {}ms before retry", delay.as_millis()))
    }

    /// Tell the service a dependency is answering again. Clears its
    /// rate-limit backoff.
    pub fn report_success(&self, dependency: &str) {
        if self.rate_limit_hits.lock().remove(dependency).is_some() {
            tracing::debug!(dependency, "rate limit backoff cleared");
        }
    }

    /// Persisted recovery history for a dependency.
    pub fn history(&self, dependency: &str) -> RecoveryHistory {
        match self.store.get(HISTORY_NAMESPACE, dependency) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(None) => RecoveryHistory::default(),
            Err(err) => {
                tracing::warn!(dependency, error = %err, "recovery history unreadable");
                RecoveryHistory::default()
            }
        }
    }

    fn record_history(&self, dependency: &str, recovered: bool, took: Duration) {
        let mut history = self.history(dependency);
        history.record(recovered, took);
        let written = serde_json::to_value(history)
            .map_err(RsError::from)
            .and_then(|value| self.store.set(HISTORY_NAMESPACE, dependency, value, None));
        if let Err(err) = written {
            tracing::warn!(dependency, error = %err, "failed to persist recovery history");
        }
    }

    /// Run every health check.
    pub fn perform_health_check(&self) -> BTreeMap<String, HealthCheck> {
        match self.store.purge_expired() {
            Ok(purged) if purged > 0 => tracing::debug!(purged, "purged expired state entries"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "failed to purge expired state entries"),
        }

        let mut checks = BTreeMap::new();
        checks.insert(
            "database".to_string(),
            health::check_store(self.store.as_ref(), self.clock.as_ref()),
        );
        checks.insert("memory".to_string(), health::check_memory(&self.config.health));
        let data_dir = self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        checks.insert("disk".to_string(), health::check_disk(&data_dir, &self.config.health));
        checks.insert("vector_index".to_string(), self.breaker_check("vector_index"));
        checks.insert("external_service".to_string(), self.breaker_check("embedding_api"));

        for probe in &self.probes {
            checks.insert(probe.name().to_string(), probe.check());
        }

        let overall = health::overall(checks.values());
        tracing::debug!(overall = %overall, checks = checks.len(), "health check complete");
        checks
    }

    fn breaker_check(&self, dependency: &str) -> HealthCheck {
        let Some(registry) = &self.registry else {
            return HealthCheck::warning("no circuit breaker registry attached");
        };
        if !registry.is_known(dependency) {
            return HealthCheck::healthy(format!("{dependency} not monitored"));
        }
        match registry.circuit_breaker(dependency, None) {
            Ok(breaker) => health::check_circuit(dependency, breaker.state()),
            Err(err) => HealthCheck::warning(format!("{dependency} breaker unavailable: {}", err.code())),
        }
    }
}
