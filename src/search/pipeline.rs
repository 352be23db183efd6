//! Query pipeline
//!
//! Text goes through the lexical compiler, the embedding cache, and the
//! breaker-guarded embedder before the builder emits SQL. When the embedding
//! leg fails or its circuit is open, the pipeline degrades to a lexical-only
//! query and attaches a user-facing degradation message.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{ErrorCode, Result, RsError};
use crate::resilience::{
    CircuitBreaker, DegradationMessage, DegradationMessageService, DegradedMode, ErrorContext,
};
use crate::search::builder::{HybridQuery, HybridQueryBuilder, HybridSpec};
use crate::search::embedding_cache::EmbeddingCache;
use crate::search::embeddings::Embedder;
use crate::search::text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    LexicalOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    Cache,
    Fresh,
}

/// A query ready to execute.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedQuery {
    pub mode: SearchMode,
    pub query: HybridQuery,
    pub embedding_source: Option<EmbeddingSource>,
    /// Set when the semantic leg was dropped because of a failure.
    pub degradation: Option<DegradationMessage>,
}

pub struct QueryPipeline {
    builder: HybridQueryBuilder,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
    breaker: Arc<CircuitBreaker>,
    messages: DegradationMessageService,
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("embedder", &self.embedder)
            .field("breaker", &self.breaker.dependency())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl QueryPipeline {
    pub fn new(
        builder: HybridQueryBuilder,
        cache: Arc<EmbeddingCache>,
        embedder: Arc<dyn Embedder>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            builder,
            cache,
            embedder,
            breaker,
            messages: DegradationMessageService::default(),
        }
    }

    #[must_use]
    pub fn with_messages(mut self, messages: DegradationMessageService) -> Self {
        self.messages = messages;
        self
    }

    pub fn builder(&self) -> &HybridQueryBuilder {
        &self.builder
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Plan a search for `input` against `spec`.
    ///
    /// Validation failures on the text itself are returned as errors. Any
    /// failure of the embedding leg yields a lexical-only plan instead.
    pub fn plan(&self, input: &str, spec: &HybridSpec) -> Result<PlannedQuery> {
        let normalized = text::normalize(input, &self.builder.config().text)?;
        if normalized.is_empty() || self.builder.compile(input)?.is_match_all() {
            return self.lexical_only(input, spec);
        }

        match self.query_embedding(&normalized) {
            Ok((embedding, source)) => Ok(PlannedQuery {
                mode: SearchMode::Hybrid,
                query: self.builder.hybrid_sql(input, &embedding, spec)?,
                embedding_source: Some(source),
                degradation: None,
            }),
            // Token-less text is planned lexically and never degrades.
            Err(err) if err.code() == ErrorCode::InvalidEmbedding => {
                tracing::debug!(
                    error = %err,
                    "query has no embeddable tokens, using lexical search"
                );
                self.lexical_only(input, spec)
            }
            Err(err) => {
                let consecutive_failures = self.breaker.statistics().failure_count;
                let mut context = ErrorContext::for_dependency(self.breaker.dependency())
                    .with_operation("embed_query")
                    .with_consecutive_failures(consecutive_failures);
                context.degraded_mode = Some(DegradedMode::LexicalOnly);
                let message = self.messages.generate_message(&err, &context);
                tracing::warn!(
                    dependency = %self.breaker.dependency(),
                    code = %err.code(),
                    error = %err,
                    "embedding unavailable, falling back to lexical search"
                );
                Ok(PlannedQuery {
                    mode: SearchMode::LexicalOnly,
                    query: self.builder.lexical_sql(input, spec)?,
                    embedding_source: None,
                    degradation: Some(message),
                })
            }
        }
    }

    fn lexical_only(&self, input: &str, spec: &HybridSpec) -> Result<PlannedQuery> {
        Ok(PlannedQuery {
            mode: SearchMode::LexicalOnly,
            query: self.builder.lexical_sql(input, spec)?,
            embedding_source: None,
            degradation: None,
        })
    }

    /// Embedding for normalized query text, from cache when possible.
    pub fn query_embedding(&self, normalized: &str) -> Result<(Vec<f32>, EmbeddingSource)> {
        let fingerprint = EmbeddingCache::fingerprint(normalized);
        if let Some(vector) = self.cache.get(&fingerprint) {
            return Ok((vector, EmbeddingSource::Cache));
        }

        let embedder = Arc::clone(&self.embedder);
        let vector = self.breaker.execute(|| embedder.embed(normalized))?;
        if let Err(err) = self.cache.set(&fingerprint, vector.clone(), None) {
            tracing::warn!(error = %err, "failed to cache query embedding");
        }
        Ok((vector, EmbeddingSource::Fresh))
    }

    /// Embeddings for a batch of documents, in input order.
    ///
    /// Cached vectors are reused; misses are embedded in one breaker-guarded
    /// call and cached together.
    pub fn embed_documents(&self, documents: &[&str]) -> Result<Vec<Vec<f32>>> {
        let fingerprints: Vec<String> = documents
            .iter()
            .map(|d| EmbeddingCache::fingerprint(d))
            .collect();
        let cached = self.cache.get_multiple(&fingerprints);

        let mut missing_idx = Vec::new();
        for (idx, fingerprint) in fingerprints.iter().enumerate() {
            let pending = missing_idx
                .iter()
                .any(|&i: &usize| fingerprints[i] == *fingerprint);
            if !cached.contains_key(fingerprint) && !pending {
                missing_idx.push(idx);
            }
        }

        let mut fresh = Vec::new();
        if !missing_idx.is_empty() {
            let texts: Vec<&str> = missing_idx.iter().map(|&i| documents[i]).collect();
            let embedder = Arc::clone(&self.embedder);
            let vectors = self.breaker.execute(|| embedder.embed_batch(&texts))?;
            if vectors.len() != texts.len() {
                return Err(RsError::Internal(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            fresh = missing_idx
                .iter()
                .map(|&i| fingerprints[i].clone())
                .zip(vectors)
                .collect::<Vec<_>>();
            if fresh.len() <= self.cache.capacity() {
                if let Err(err) = self.cache.set_multiple(fresh.clone(), None) {
                    tracing::warn!(error = %err, "failed to cache document embeddings");
                }
            }
        }

        fingerprints
            .iter()
            .map(|fp| {
                cached
                    .get(fp)
                    .or_else(|| fresh.iter().find(|(k, _)| k == fp).map(|(_, v)| v))
                    .cloned()
                    .ok_or_else(|| RsError::Internal(format!("no embedding for {fp}")))
            })
            .collect()
    }
}
