//! Weighted score fusion
//!
//! In-process counterpart of [`HybridQueryBuilder::hybrid_sql`] for callers
//! that run the lexical and vector legs separately:
//!
//! ```text
//! score(d) = text_weight * lexical(d) + vector_weight * vector(d) [+ boost]
//! ```
//!
//! A document missing from a leg scores 0 there. Each leg is capped at
//! `max_results` before combination; vector hits below
//! `similarity_threshold` are dropped.
//!
//! [`HybridQueryBuilder::hybrid_sql`]: crate::search::builder::HybridQueryBuilder::hybrid_sql

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::search::builder::{EXACT_MATCH_BOOST, HybridConfig, validate_weights};

/// One row from a single retrieval leg.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    /// Lexical leg only: the exact-match column equals the query text.
    pub exact_match: bool,
}

impl ScoredHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            exact_match: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }
}

/// A fused result.
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub id: String,
    pub score: f32,
    /// 1-indexed position in the lexical leg
    pub lexical_rank: Option<usize>,
    /// 1-indexed position in the vector leg
    pub vector_rank: Option<usize>,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub exact_match: bool,
}

impl FusedResult {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            score: 0.0,
            lexical_rank: None,
            vector_rank: None,
            lexical_score: None,
            vector_score: None,
            exact_match: false,
        }
    }
}

fn by_score_desc(a: &ScoredHit, b: &ScoredHit) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// Fuse two result lists under the hybrid weights.
///
/// Inputs need not be sorted. Output is sorted by fused score, ties broken
/// by id, and capped at `max_results`.
pub fn combine_scores(lexical: &[ScoredHit], vector: &[ScoredHit], config: &HybridConfig) -> Result<Vec<FusedResult>> {
    validate_weights(config.text_weight, config.vector_weight)?;

    let mut lexical: Vec<&ScoredHit> = lexical.iter().filter(|h| h.score.is_finite()).collect();
    lexical.sort_by(|a, b| by_score_desc(a, b));
    lexical.truncate(config.max_results);

    let mut vector: Vec<&ScoredHit> = vector
        .iter()
        .filter(|h| h.score.is_finite() && h.score >= config.similarity_threshold)
        .collect();
    vector.sort_by(|a, b| by_score_desc(a, b));
    vector.truncate(config.max_results);

    let mut fused: HashMap<&str, FusedResult> = HashMap::new();

    for (rank, hit) in lexical.iter().enumerate() {
        let entry = fused
            .entry(hit.id.as_str())
            .or_insert_with(|| FusedResult::empty(&hit.id));
        // First (highest) occurrence wins on duplicate ids.
        if entry.lexical_rank.is_none() {
            entry.lexical_rank = Some(rank + 1);
            entry.lexical_score = Some(hit.score);
            entry.exact_match = hit.exact_match;
        }
    }

    for (rank, hit) in vector.iter().enumerate() {
        let entry = fused
            .entry(hit.id.as_str())
            .or_insert_with(|| FusedResult::empty(&hit.id));
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(rank + 1);
            entry.vector_score = Some(hit.score);
        }
    }

    let mut results: Vec<FusedResult> = fused
        .into_values()
        .map(|mut r| {
            r.score = config.text_weight * r.lexical_score.unwrap_or(0.0)
                + config.vector_weight * r.vector_score.unwrap_or(0.0);
            if config.boost_exact_matches && r.exact_match {
                r.score += EXACT_MATCH_BOOST;
            }
            r
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(config.max_results);
    Ok(results)
}
