//! Bounded in-process embedding cache
//!
//! Maps a SHA-256 content fingerprint to its embedding vector. Entries expire
//! per their TTL (checked lazily on read and by [`EmbeddingCache::maintenance`])
//! and the least-recently-used entry is evicted when the cache is full.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RsError};
use crate::utils::clock::{Clock, checked_after};

/// Length of a hex-encoded SHA-256 digest.
const FINGERPRINT_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingCacheConfig {
    pub max_entries: usize,
    /// TTL for entries stored without one. `0` means no expiry.
    pub default_ttl_secs: u64,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Counters since creation (or the last [`EmbeddingCache::clear`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub total_entries: usize,
}

impl CacheStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

pub struct EmbeddingCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .field("len", &self.inner.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    pub fn new(config: &EmbeddingCacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_entries)
            .ok_or_else(|| RsError::Config("cache.max_entries must be greater than 0".to_string()))?;
        let default_ttl = (config.default_ttl_secs > 0).then(|| Duration::from_secs(config.default_ttl_secs));
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
            default_ttl,
            clock,
        })
    }

    /// SHA-256 hex fingerprint of `content`, the cache key format.
    pub fn fingerprint(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Look up a vector. Expired entries are removed and count as misses.
    pub fn get(&self, hash: &str) -> Option<Vec<f32>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        lookup(&mut inner, hash, now)
    }

    /// Store a vector under `hash`, using the default TTL when `ttl` is `None`.
    pub fn set(&self, hash: &str, vector: Vec<f32>, ttl: Option<Duration>) -> Result<()> {
        validate_fingerprint(hash)?;
        validate_vector(hash, &vector)?;
        let entry = self.entry(vector, ttl);
        let mut inner = self.inner.lock();
        insert(&mut inner, hash.to_string(), entry);
        Ok(())
    }

    /// Look up several hashes. Only hits are returned.
    pub fn get_multiple<S: AsRef<str>>(&self, hashes: &[S]) -> HashMap<String, Vec<f32>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        hashes
            .iter()
            .filter_map(|hash| {
                let hash = hash.as_ref();
                lookup(&mut inner, hash, now).map(|v| (hash.to_string(), v))
            })
            .collect()
    }

    /// Store several vectors. All-or-nothing: every entry is validated before
    /// any is written, and a batch larger than the cache is rejected.
    pub fn set_multiple(&self, items: Vec<(String, Vec<f32>)>, ttl: Option<Duration>) -> Result<()> {
        if items.len() > self.capacity.get() {
            return Err(RsError::Validation(format!(
                "batch of {} embeddings exceeds cache capacity {}",
                items.len(),
                self.capacity
            )));
        }
        for (hash, vector) in &items {
            validate_fingerprint(hash)?;
            validate_vector(hash, vector)?;
        }

        let mut inner = self.inner.lock();
        for (hash, vector) in items {
            let entry = self.entry(vector, ttl);
            insert(&mut inner, hash, entry);
        }
        Ok(())
    }

    /// Remove one entry. Returns whether it was present and live.
    pub fn invalidate(&self, hash: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.entries.pop(hash).is_some_and(|e| !e.is_expired(now))
    }

    /// Remove everything and reset counters. Returns how many entries were
    /// dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.stats = CacheStats::default();
        tracing::debug!(removed, "embedding cache cleared");
        removed
    }

    /// Sweep expired entries. Returns how many were removed.
    pub fn maintenance(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in &expired {
            inner.entries.pop(hash);
        }
        inner.stats.expirations += expired.len() as u64;
        if !expired.is_empty() {
            tracing::debug!(expired = expired.len(), "embedding cache maintenance");
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            total_entries: inner.entries.len(),
            ..inner.stats
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, vector: Vec<f32>, ttl: Option<Duration>) -> CacheEntry {
        let now = self.clock.now();
        let ttl = ttl.or(self.default_ttl);
        CacheEntry {
            vector,
            created_at: now,
            expires_at: ttl.and_then(|ttl| checked_after(now, ttl)),
        }
    }
}

fn lookup(inner: &mut Inner, hash: &str, now: DateTime<Utc>) -> Option<Vec<f32>> {
    let expired = match inner.entries.get(hash) {
        Some(entry) if !entry.is_expired(now) => {
            let vector = entry.vector.clone();
            let age_ms = (now - entry.created_at).num_milliseconds();
            inner.stats.hits += 1;
            tracing::trace!(hash, age_ms, "embedding cache hit");
            return Some(vector);
        }
        Some(_) => true,
        None => false,
    };
    if expired {
        inner.entries.pop(hash);
        inner.stats.expirations += 1;
    }
    inner.stats.misses += 1;
    tracing::trace!(hash, expired, "embedding cache miss");
    None
}

fn insert(inner: &mut Inner, hash: String, entry: CacheEntry) {
    if let Some((evicted, _)) = inner.entries.push(hash.clone(), entry) {
        if evicted != hash {
            inner.stats.evictions += 1;
            tracing::trace!(evicted = %evicted, "embedding cache eviction");
        }
    }
    inner.stats.sets += 1;
}

/// Check that `hash` is a lowercase hex SHA-256 digest.
pub fn validate_fingerprint(hash: &str) -> Result<()> {
    let well_formed = hash.len() == FINGERPRINT_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if well_formed {
        Ok(())
    } else {
        Err(RsError::InvalidFingerprint(format!(
            "expected {FINGERPRINT_LEN} lowercase hex characters, got {:?}",
            crate::search::text::truncate(hash, 80)
        )))
    }
}

/// Check that a vector is non-empty and finite.
pub fn validate_vector(hash: &str, vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(RsError::InvalidEmbedding(format!("empty vector for {hash}")));
    }
    if let Some(idx) = vector.iter().position(|v| !v.is_finite()) {
        return Err(RsError::InvalidEmbedding(format!(
            "non-finite value at index {idx} for {hash}"
        )));
    }
    Ok(())
}
