//! Embedding backends
//!
//! The query pipeline reaches embeddings through [`Embedder`], wrapped in the
//! `embedding_api` circuit breaker. [`HashEmbedder`] is a deterministic
//! FNV-1a feature-hashing backend with no model dependencies.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RsError};

/// Dependency id the embedding backend is guarded under.
pub const EMBEDDING_DEPENDENCY: &str = "embedding_api";

/// Pluggable embedding backend.
pub trait Embedder: Send + Sync + std::fmt::Debug {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dims(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// `hash` or `none`.
    pub backend: String,
    pub dims: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: "hash".to_string(),
            dims: 384,
        }
    }
}

/// Build an embedder from config.
pub fn build_embedder(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    if config.dims == 0 {
        return Err(RsError::Config(
            "embedding.dims must be greater than 0".to_string(),
        ));
    }
    match config.backend.trim().to_lowercase().as_str() {
        "" | "hash" => Ok(Box::new(HashEmbedder::new(config.dims))),
        "none" => Ok(Box::new(UnavailableEmbedder { dims: config.dims })),
        other => Err(RsError::Config(format!("unknown embedding backend: {other}"))),
    }
}

/// Hash embedder using FNV-1a over unigrams and bigrams.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_tokens(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut embedding = vec![0.0; self.dim];
        for token in &tokens {
            accumulate(&mut embedding, token, 1.0);
        }
        for window in tokens.windows(2) {
            accumulate(&mut embedding, &format!("{} {}", window[0], window[1]), 0.5);
        }
        l2_normalize(&mut embedding);
        embedding
    }
}

impl Embedder for HashEmbedder {
    /// Fails on text with no indexable tokens, since a zero vector has no
    /// direction to compare.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(RsError::Config("embedding dimension is 0".to_string()));
        }
        let embedding = self.embed_tokens(text);
        if embedding.iter().all(|v| *v == 0.0) {
            return Err(RsError::InvalidEmbedding(
                "text has no tokens to embed".to_string(),
            ));
        }
        Ok(embedding)
    }

    fn dims(&self) -> usize {
        self.dim
    }
}

/// Backend for deployments without an embedding service. Every call reports
/// the service as unavailable, so searches run lexical-only.
#[derive(Debug, Clone)]
pub struct UnavailableEmbedder {
    dims: usize,
}

impl Embedder for UnavailableEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RsError::ServiceUnavailable {
            dependency: EMBEDDING_DEPENDENCY.to_string(),
            message: "no embedding backend configured".to_string(),
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Cosine similarity; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|token| token.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn accumulate(embedding: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a(token.as_bytes());
    let len = embedding.len();
    for i in 0..len {
        let mut salted = [0u8; 16];
        salted[..8].copy_from_slice(&token_hash.to_le_bytes());
        salted[8..].copy_from_slice(&(i as u64).to_le_bytes());
        let dim_hash = fnv1a(&salted);
        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        embedding[((dim_hash >> 1) as usize) % len] += sign;
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    data.iter()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn fnv1a_known_value() {
        assert_eq!(fnv1a(b"hello"), 0xa430_d846_80aa_bd0b);
    }

    #[test]
    fn embedding_is_normalized() {
        let embedder = HashEmbedder::new(128);
        let embedding = embedder.embed("circuit breaker for the embedding service").unwrap();
        assert_eq!(embedding.len(), 128);
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn tokenless_text_is_rejected() {
        let err = HashEmbedder::new(32).embed("a b c").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEmbedding);
    }

    #[test]
    fn related_text_is_more_similar() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("vector index rebuild").unwrap();
        let b = embedder.embed("vector index repair").unwrap();
        let c = embedder.embed("quantum entanglement photons").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        assert_eq!(embedder.embed("same text").unwrap(), embedder.embed("same text").unwrap());
    }

    #[test]
    fn build_embedder_backends() {
        let hash = build_embedder(&EmbedderConfig::default()).unwrap();
        assert_eq!(hash.dims(), 384);

        let none = build_embedder(&EmbedderConfig {
            backend: "none".to_string(),
            dims: 8,
        })
        .unwrap();
        let err = none.embed("anything").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(err.dependency(), Some(EMBEDDING_DEPENDENCY));

        assert!(build_embedder(&EmbedderConfig {
            backend: "quantum".to_string(),
            dims: 8,
        })
        .is_err());
        assert!(build_embedder(&EmbedderConfig {
            backend: "hash".to_string(),
            dims: 0,
        })
        .is_err());
    }

    #[test]
    fn batch_embeds_each_text() {
        let embedder = HashEmbedder::new(16);
        let batch = embedder.embed_batch(&["first text", "second text"]).unwrap();
        assert_eq!(batch.len(), 2);
    }
}
