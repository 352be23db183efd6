//! Hybrid retrieval
//!
//! Turns free text into a combined lexical + vector query.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Search text                            │
//! └────────────────────────────────────────────────────────────────┘
//!                     │                          │
//!                     ▼                          ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │  QueryCompiler (query.rs)    │  │  EmbeddingCache ─▶ Embedder  │
//! │  text ─▶ tsquery tree        │  │  (breaker: embedding_api)    │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                     │                          │
//!                     └──────────┬───────────────┘
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │ HybridQueryBuilder (SQL)      │
//!                │ or combine_scores (fusion.rs) │
//!                └───────────────────────────────┘
//! ```

pub mod builder;
pub mod embedding_cache;
pub mod embeddings;
pub mod fusion;
pub mod pipeline;
pub mod query;
pub mod text;

pub use builder::{
    DistanceMetric, FieldWeight, HighlightConfig, HybridConfig, HybridQuery, HybridQueryBuilder, HybridSpec,
    RankingConfig, SearchConfig, SqlParam, TsQuery, TsVectorOptions, validate_weights,
};
pub use embedding_cache::{CacheStats, EmbeddingCache, EmbeddingCacheConfig};
pub use embeddings::{Embedder, EmbedderConfig, HashEmbedder, build_embedder};
pub use fusion::{FusedResult, ScoredHit, combine_scores};
pub use pipeline::{EmbeddingSource, PlannedQuery, QueryPipeline, SearchMode};
pub use query::{LexicalExpr, QueryCompiler};
pub use text::TextConfig;
