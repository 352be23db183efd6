use resilient_search::app::AppContext;
use resilient_search::cli::OutputFormat;
use resilient_search::config::{Config, StorageBackend};
use resilient_search::resilience::CircuitState;
use resilient_search::search::{EmbeddingSource, FieldWeight, HybridSpec, SearchMode, SqlParam};
use resilient_search::test_utils::{StateFixture, TestLogger};

fn spec() -> HybridSpec {
    HybridSpec {
        table: "documents".to_string(),
        id_column: "id".to_string(),
        fields: vec![("title".to_string(), FieldWeight::A), ("body".to_string(), FieldWeight::B)],
        embedding_column: "embedding".to_string(),
        exact_match_column: Some("title".to_string()),
    }
}

fn context(fixture: &StateFixture, backend: &str) -> AppContext {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.data_dir = Some(fixture.path().join("data"));
    config.embedding.backend = backend.to_string();
    AppContext::build(
        fixture.path(),
        config,
        fixture.path().join("config.toml"),
        OutputFormat::Json,
        fixture.clock(),
    )
    .unwrap()
}

#[test]
fn second_identical_query_uses_cached_embedding() {
    let log = TestLogger::new("second_identical_query_uses_cached_embedding");
    let fixture = StateFixture::new().unwrap();
    let ctx = context(&fixture, "hash");
    let pipeline = ctx.query_pipeline().unwrap();

    let first = pipeline.plan(r#""circuit breaker" patterns"#, &spec()).unwrap();
    log.observe("first plan", &first.mode);
    assert_eq!(first.mode, SearchMode::Hybrid);
    assert_eq!(first.embedding_source, Some(EmbeddingSource::Fresh));
    assert!(first.degradation.is_none());
    assert!(first.query.params.iter().any(|p| matches!(p, SqlParam::Vector(_))));
    assert!(first.query.sql.contains("FULL OUTER JOIN"));

    let second = pipeline.plan(r#""circuit breaker" patterns"#, &spec()).unwrap();
    assert_eq!(second.embedding_source, Some(EmbeddingSource::Cache));
    assert_eq!(pipeline.cache().stats().hits, 1);
    log.pass();
}

#[test]
fn failing_embedder_degrades_then_opens_the_circuit() {
    let log = TestLogger::new("failing_embedder_degrades_then_opens_the_circuit");
    let fixture = StateFixture::new().unwrap();
    let ctx = context(&fixture, "none");
    let pipeline = ctx.query_pipeline().unwrap();
    let threshold = ctx.config.breaker.defaults.failure_threshold;

    for attempt in 0..threshold {
        let planned = pipeline.plan("rust search", &spec()).unwrap();
        assert_eq!(planned.mode, SearchMode::LexicalOnly, "attempt {attempt}");
        assert!(planned.degradation.is_some());
        assert!(planned.query.params.iter().all(|p| matches!(p, SqlParam::Text(_))));
    }
    log.step("threshold reached");

    let stats = ctx.registry.all_statistics().unwrap();
    assert_eq!(stats["embedding_api"].state, CircuitState::Open);

    let planned = pipeline.plan("rust search", &spec()).unwrap();
    assert_eq!(planned.mode, SearchMode::LexicalOnly);
    let message = planned.degradation.unwrap();
    assert!(!message.title.is_empty());
    assert!(!message.message.contains("no embedding backend configured"));
    log.pass();
}

#[test]
fn blank_query_plans_match_all_without_embedding() {
    let fixture = StateFixture::new().unwrap();
    let ctx = context(&fixture, "hash");
    let pipeline = ctx.query_pipeline().unwrap();

    let planned = pipeline.plan("   ", &spec()).unwrap();
    assert_eq!(planned.mode, SearchMode::LexicalOnly);
    assert!(planned.embedding_source.is_none());
    assert!(planned.degradation.is_none());
    assert!(planned.query.lexical.is_match_all());
    assert!(pipeline.cache().is_empty());
}

#[test]
fn breaker_state_is_shared_through_the_state_db() {
    let fixture = StateFixture::new().unwrap();
    {
        let ctx = context(&fixture, "none");
        let pipeline = ctx.query_pipeline().unwrap();
        for _ in 0..ctx.config.breaker.defaults.failure_threshold {
            pipeline.plan("anything", &spec()).unwrap();
        }
    }

    let ctx = context(&fixture, "hash");
    let stats = ctx.registry.all_statistics().unwrap();
    assert_eq!(stats["embedding_api"].state, CircuitState::Open);

    // Open circuit: even a working embedder is not consulted.
    let planned = ctx.query_pipeline().unwrap().plan("anything", &spec()).unwrap();
    assert_eq!(planned.mode, SearchMode::LexicalOnly);

    ctx.registry.reset_all().unwrap();
    let planned = ctx.query_pipeline().unwrap().plan("anything", &spec()).unwrap();
    assert_eq!(planned.mode, SearchMode::Hybrid);
}
