//! Keyed registry of circuit breakers.
//!
//! One breaker per dependency id, created on first request and reused. Only
//! ids from the configured known set are accepted, which keeps the registry
//! (and the persisted key space) bounded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, RsError};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStatistics};
use crate::storage::KeyValueStore;
use crate::utils::clock::Clock;

/// Dependency ids accepted when no list is configured.
pub const DEFAULT_DEPENDENCIES: [&str; 3] = ["database", "embedding_api", "vector_index"];

pub struct CircuitBreakerRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    known: BTreeSet<String>,
    breakers: RwLock<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("known", &self.known)
            .field("active", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry {
    /// Registry over the default dependency set and default thresholds.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            defaults: CircuitBreakerConfig::default(),
            overrides: HashMap::new(),
            known: DEFAULT_DEPENDENCIES.iter().map(ToString::to_string).collect(),
            breakers: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: CircuitBreakerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replace the accepted dependency ids.
    #[must_use]
    pub fn with_known_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Per-dependency thresholds used when a breaker is first created.
    #[must_use]
    pub fn with_override(mut self, id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(id.into(), config);
        self
    }

    pub fn known_dependencies(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    /// Get the breaker for `id`, creating it on first use.
    ///
    /// `config` only applies when the breaker does not exist yet; an existing
    /// breaker keeps the thresholds it was created with.
    pub fn circuit_breaker(&self, id: &str, config: Option<CircuitBreakerConfig>) -> Result<Arc<CircuitBreaker>> {
        if !self.is_known(id) {
            return Err(RsError::UnknownDependency(id.to_string()));
        }

        if let Some(existing) = self.breakers.read().get(id) {
            if config.as_ref().is_some_and(|c| c != existing.config()) {
                tracing::debug!(dependency = id, "breaker exists, ignoring new config");
            }
            return Ok(Arc::clone(existing));
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(id.to_string()).or_insert_with(|| {
            let config = config
                .or_else(|| self.overrides.get(id).cloned())
                .unwrap_or_else(|| self.defaults.clone());
            tracing::debug!(dependency = id, "creating circuit breaker");
            Arc::new(CircuitBreaker::new(
                id,
                config,
                Arc::clone(&self.store),
                Arc::clone(&self.clock),
            ))
        });
        Ok(Arc::clone(breaker))
    }

    /// Statistics for every known dependency, keyed by id.
    pub fn all_statistics(&self) -> Result<BTreeMap<String, CircuitStatistics>> {
        let mut stats = BTreeMap::new();
        for id in &self.known {
            let breaker = self.circuit_breaker(id, None)?;
            stats.insert(id.clone(), breaker.statistics());
        }
        Ok(stats)
    }

    /// Reset every known breaker to Closed. Returns how many were reset.
    pub fn reset_all(&self) -> Result<usize> {
        let mut reset = 0;
        for id in &self.known {
            self.circuit_breaker(id, None)?.reset()?;
            reset += 1;
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::storage::MemoryStore;
    use crate::utils::clock::ManualClock;

    fn registry() -> CircuitBreakerRegistry {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        CircuitBreakerRegistry::new(store, clock)
    }

    #[test]
    fn reuses_breaker_per_id() {
        let registry = registry();
        let a = registry.circuit_breaker("database", None).unwrap();
        let b = registry.circuit_breaker("database", None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rejects_unknown_ids() {
        let registry = registry();
        let err = registry.circuit_breaker("made_up", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownDependency);
    }

    #[test]
    fn first_config_wins() {
        let registry = registry();
        let custom = CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        };
        let first = registry
            .circuit_breaker("vector_index", Some(custom.clone()))
            .unwrap();
        assert_eq!(first.config().failure_threshold, 2);
        let second = registry
            .circuit_breaker("vector_index", Some(CircuitBreakerConfig::default()))
            .unwrap();
        assert_eq!(second.config().failure_threshold, 2);
    }

    #[test]
    fn overrides_apply_on_creation() {
        let registry = registry().with_override(
            "embedding_api",
            CircuitBreakerConfig {
                recovery_timeout_secs: 5,
                ..Default::default()
            },
        );
        let breaker = registry.circuit_breaker("embedding_api", None).unwrap();
        assert_eq!(breaker.config().recovery_timeout_secs, 5);
    }

    #[test]
    fn statistics_cover_known_dependencies() {
        let registry = registry().with_known_dependencies(["database", "search_api"]);
        let stats = registry.all_statistics().unwrap();
        assert_eq!(stats.keys().cloned().collect::<Vec<_>>(), vec!["database", "search_api"]);
        assert!(stats.values().all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn reset_all_closes_open_circuits() {
        let registry = registry().with_defaults(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        let db = registry.circuit_breaker("database", None).unwrap();
        db.execute::<(), _>(|| {
            Err(RsError::Connectivity {
                dependency: "database".into(),
                message: "refused".into(),
            })
        })
        .unwrap_err();
        assert_eq!(db.state(), CircuitState::Open);
        assert_eq!(registry.reset_all().unwrap(), 3);
        assert_eq!(db.state(), CircuitState::Closed);
    }

    #[test]
    fn breakers_share_state_through_the_store() {
        let clock = Arc::new(ManualClock::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(clock.clone()));
        let defaults = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let one = CircuitBreakerRegistry::new(Arc::clone(&store), clock.clone()).with_defaults(defaults.clone());
        let two = CircuitBreakerRegistry::new(store, clock).with_defaults(defaults);

        one.circuit_breaker("embedding_api", None)
            .unwrap()
            .execute::<(), _>(|| Err(RsError::Transient("flaky".into())))
            .unwrap_err();
        assert_eq!(
            two.circuit_breaker("embedding_api", None).unwrap().state(),
            CircuitState::Open
        );
    }
}
