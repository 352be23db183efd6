use std::time::Duration;

use resilient_search::RsError;
use resilient_search::resilience::{CallResult, CircuitBreakerConfig, CircuitState};
use resilient_search::test_utils::{ScriptedDependency, StateFixture, TestLogger};

fn unavailable() -> RsError {
    RsError::ServiceUnavailable {
        dependency: "vector_index".to_string(),
        message: "connection refused".to_string(),
    }
}

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 2,
        recovery_timeout_secs: 60,
        success_threshold: 2,
        timeout_ms: None,
        ..CircuitBreakerConfig::default()
    }
}

#[test]
fn open_state_survives_reopening_the_store() {
    let log = TestLogger::new("open_state_survives_reopening_the_store");
    let fixture = StateFixture::new().unwrap();
    let dep = ScriptedDependency::new().then_fail_times(2, unavailable);

    {
        let store = fixture.sqlite_store().unwrap();
        let breaker = fixture.breaker("vector_index", config(), store);
        assert!(breaker.execute(|| dep.call()).is_err());
        assert!(breaker.execute(|| dep.call()).is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }
    log.step("store dropped while open");

    let store = fixture.sqlite_store().unwrap();
    let breaker = fixture.breaker("vector_index", config(), store);
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = breaker.execute(|| dep.call()).unwrap_err();
    assert!(matches!(err, RsError::CircuitOpen { .. }));
    assert_eq!(dep.calls(), 2, "open circuit must not invoke the dependency");

    fixture.advance(Duration::from_secs(61));
    breaker.execute(|| dep.call()).unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.execute(|| dep.call()).unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.statistics();
    log.observe("statistics", &stats);
    assert_eq!(stats.failure_count, 0);
    assert!(stats.next_attempt_at.is_none());
    log.pass();
}

#[test]
fn breakers_sharing_a_store_see_each_others_state() {
    let fixture = StateFixture::new().unwrap();
    let store = fixture.sqlite_store().unwrap();
    let first = fixture.breaker("database", config(), store.clone());
    let second = fixture.breaker("database", config(), store);

    let dep = ScriptedDependency::new().then_fail_times(2, unavailable);
    assert!(first.execute(|| dep.call()).is_err());
    assert!(second.execute(|| dep.call()).is_err());

    assert_eq!(first.state(), CircuitState::Open);
    assert_eq!(second.state(), CircuitState::Open);
}

#[test]
fn metrics_record_rejections() {
    let fixture = StateFixture::new().unwrap();
    let store = fixture.sqlite_store().unwrap();
    let breaker = fixture.breaker("embedding_api", config(), store);
    let dep = ScriptedDependency::new().then_fail_times(2, unavailable);

    for _ in 0..3 {
        let _ = breaker.execute(|| dep.call());
        fixture.advance(Duration::from_millis(5));
    }

    let metrics = breaker.recent_metrics().unwrap();
    let results: Vec<CallResult> = metrics.iter().map(|m| m.result).collect();
    assert_eq!(results, vec![CallResult::Failure, CallResult::Failure, CallResult::Rejected]);
}

#[test]
fn registry_reset_closes_every_breaker() {
    let fixture = StateFixture::new().unwrap();
    let store = fixture.sqlite_store().unwrap();
    let registry = fixture
        .registry(store)
        .with_defaults(config())
        .with_known_dependencies(["database", "vector_index"]);

    for id in ["database", "vector_index"] {
        let breaker = registry.circuit_breaker(id, None).unwrap();
        let dep = ScriptedDependency::new().then_fail_times(2, unavailable);
        let _ = breaker.execute(|| dep.call());
        let _ = breaker.execute(|| dep.call());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    assert_eq!(registry.reset_all().unwrap(), 2);
    let stats = registry.all_statistics().unwrap();
    assert!(stats.values().all(|s| s.state == CircuitState::Closed));
}
