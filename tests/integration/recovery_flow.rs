use std::time::Duration;

use resilient_search::RsError;
use resilient_search::resilience::{
    DegradationMessageService, DegradedMode, ErrorClassifier, ErrorContext, ErrorRecoveryService, RecoveryConfig,
    RecoveryStrategy, ServiceStatus,
};
use resilient_search::test_utils::StateFixture;

fn service(fixture: &StateFixture) -> ErrorRecoveryService {
    ErrorRecoveryService::new(
        ErrorClassifier::default(),
        RecoveryConfig::default(),
        fixture.sqlite_store().unwrap(),
        fixture.clock(),
    )
}

#[test]
fn rate_limit_backoff_doubles_and_resets() {
    let fixture = StateFixture::new().unwrap();
    let recovery = service(&fixture);
    let error = RsError::RateLimited {
        dependency: "embedding_api".to_string(),
        retry_after: Some(Duration::from_secs(1)),
    };

    for _ in 0..3 {
        let mut context = ErrorContext::for_dependency("embedding_api");
        assert!(recovery.attempt_recovery(&error, &mut context));
    }
    assert_eq!(
        fixture.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(recovery.rate_limit_hits("embedding_api"), 3);

    recovery.report_success("embedding_api");
    assert_eq!(recovery.rate_limit_hits("embedding_api"), 0);
}

#[test]
fn history_persists_across_service_instances() {
    let fixture = StateFixture::new().unwrap();
    let error = RsError::CircuitOpen {
        dependency: "vector_index".to_string(),
    };

    {
        let recovery = service(&fixture);
        let mut context = ErrorContext::for_dependency("vector_index");
        let outcome = recovery.recover(&error, &mut context);
        assert!(outcome.recovered);
        assert_eq!(outcome.classification.recovery_strategy, RecoveryStrategy::CircuitBreakerFallback);
        assert_eq!(context.degraded_mode, Some(DegradedMode::LexicalOnly));
    }

    let recovery = service(&fixture);
    let history = recovery.history("vector_index");
    assert_eq!(history.attempts, 1);
    assert_eq!(history.successes, 1);
}

#[test]
fn status_report_summarizes_concurrent_failures() {
    let messages = DegradationMessageService::new(ErrorClassifier::default());
    let errors = vec![
        RsError::CircuitOpen {
            dependency: "embedding_api".to_string(),
        },
        RsError::ServiceUnavailable {
            dependency: "vector_index".to_string(),
            message: "socket closed by peer at 10.0.0.7".to_string(),
        },
    ];

    let report = messages.generate_status_report(&errors, &ErrorContext::default());
    assert_eq!(report.status, ServiceStatus::Degraded);
    assert_eq!(report.total_issues, 2);
    assert_eq!(report.messages.len(), 2);
    assert!(report.messages.iter().all(|m| !m.message.contains("10.0.0.7")));

    let quiet = messages.generate_status_report(&[], &ErrorContext::default());
    assert_eq!(quiet.status, ServiceStatus::Operational);
    assert_eq!(quiet.total_issues, 0);
}
