//! Property tests for the cache, breaker, compiler and fusion invariants.

use std::sync::Arc;

use proptest::prelude::*;

use resilient_search::RsError;
use resilient_search::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use resilient_search::search::{
    EmbeddingCache, EmbeddingCacheConfig, HybridConfig, QueryCompiler, ScoredHit, combine_scores,
};
use resilient_search::storage::MemoryStore;
use resilient_search::utils::clock::ManualClock;

fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1000.0f32..1000.0, 1..16)
}

fn arb_hits(prefix: &'static str) -> impl Strategy<Value = Vec<ScoredHit>> {
    prop::collection::vec((0u8..40, 0.0f32..1.0, any::<bool>()), 0..30).prop_map(move |raw| {
        raw.into_iter()
            .map(|(id, score, exact)| {
                let hit = ScoredHit::new(format!("{prefix}{id}"), score);
                if exact { hit.exact() } else { hit }
            })
            .collect()
    })
}

fn cache(max_entries: usize) -> EmbeddingCache {
    let config = EmbeddingCacheConfig {
        max_entries,
        default_ttl_secs: 0,
    };
    EmbeddingCache::new(&config, Arc::new(ManualClock::new())).unwrap()
}

proptest! {
    #[test]
    fn cache_never_exceeds_capacity(
        capacity in 1usize..20,
        keys in prop::collection::vec(0u16..64, 1..100),
        vector in arb_vector(),
    ) {
        let cache = cache(capacity);
        for key in &keys {
            let hash = EmbeddingCache::fingerprint(&key.to_string());
            cache.set(&hash, vector.clone(), None).unwrap();
            prop_assert!(cache.len() <= capacity);
        }
        let last = EmbeddingCache::fingerprint(&keys[keys.len() - 1].to_string());
        prop_assert_eq!(cache.get(&last), Some(vector));
    }

    #[test]
    fn cache_returns_what_was_stored(content in ".{0,64}", vector in arb_vector()) {
        let cache = cache(8);
        let hash = EmbeddingCache::fingerprint(&content);
        cache.set(&hash, vector.clone(), None).unwrap();
        prop_assert_eq!(cache.get(&hash), Some(vector));
        prop_assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn breaker_opens_exactly_at_threshold(threshold in 1u32..10, failures in 0u32..12) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout_ms: None,
            ..CircuitBreakerConfig::default()
        };
        let breaker = CircuitBreaker::new("database", config, store, clock);

        let mut invoked = 0u32;
        for _ in 0..failures {
            let _ = breaker.execute(|| -> resilient_search::Result<()> {
                invoked += 1;
                Err(RsError::Transient("flaky".to_string()))
            });
        }

        let expected = if failures >= threshold { CircuitState::Open } else { CircuitState::Closed };
        prop_assert_eq!(breaker.state(), expected);
        prop_assert_eq!(invoked, failures.min(threshold));
    }

    #[test]
    fn compiler_handles_arbitrary_input(input in ".{0,200}") {
        let expr = QueryCompiler::default().compile(&input);
        let rendered = expr.to_tsquery();
        let opens = rendered.matches('(').count();
        let closes = rendered.matches(')').count();
        prop_assert_eq!(opens, closes);
        prop_assert_eq!(expr.is_match_all(), rendered.is_empty());
    }

    #[test]
    fn fused_results_are_sorted_unique_and_capped(
        lexical in arb_hits("doc"),
        vector in arb_hits("doc"),
        max_results in 1usize..25,
    ) {
        let config = HybridConfig { max_results, ..HybridConfig::default() };
        let fused = combine_scores(&lexical, &vector, &config).unwrap();

        prop_assert!(fused.len() <= max_results);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        let mut ids: Vec<&str> = fused.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), fused.len());
        for result in &fused {
            if let Some(score) = result.vector_score {
                prop_assert!(score >= config.similarity_threshold);
            }
        }
    }
}
