//! Namespaced key/value contract for durable resilience state.
//!
//! Circuit breaker counters, breaker metrics and recovery history all go
//! through [`KeyValueStore`]. Values are JSON so backends stay schema-free.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::utils::clock::{Clock, checked_after};

/// Minimal get/set/delete store with optional per-key expiry.
///
/// Expired entries must read as absent. Implementations are shared between
/// threads behind an `Arc`.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>>;

    fn set(&self, namespace: &str, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Returns whether it existed.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// All live keys in a namespace starting with `prefix`.
    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>>;

    /// Read a value, returning `default` when absent.
    fn get_or(&self, namespace: &str, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(namespace, key)?.unwrap_or(default))
    }

    /// Add `delta` to an integer value (absent counts as 0) and return the
    /// new value.
    ///
    /// The default is a plain read-modify-write, so two processes racing on
    /// the same key can lose an update. Backends that can do better override
    /// it.
    fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<i64> {
        let current = self
            .get(namespace, key)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let next = current.saturating_add(delta);
        self.set(namespace, key, Value::from(next), None)?;
        Ok(next)
    }

    /// Drop expired entries. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<i64>,
}

impl MemoryEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now_ms)
    }
}

/// In-process store. State does not survive the process.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries across all namespaces.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held in memory, expired or not.
    #[cfg(test)]
    pub(crate) fn stored_len(&self) -> usize {
        self.entries.read().len()
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<i64> {
        ttl.and_then(|ttl| checked_after(self.clock.now(), ttl))
            .map(|at| at.timestamp_millis())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        let entries = self.entries.read();
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn set(&self, namespace: &str, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = self.expiry(ttl);
        self.entries.write().insert(
            (namespace.to_string(), key.to_string()),
            MemoryEntry { value, expires_at },
        );
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let removed = self
            .entries
            .write()
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_millis();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|((ns, key), entry)| ns == namespace && key.starts_with(prefix) && entry.is_live(now))
            .map(|((_, key), _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<i64> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        let slot = (namespace.to_string(), key.to_string());
        let current = entries
            .get(&slot)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.as_i64())
            .unwrap_or(0);
        let next = current.saturating_add(delta);
        entries.insert(
            slot,
            MemoryEntry {
                value: Value::from(next),
                expires_at: None,
            },
        );
        Ok(next)
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
