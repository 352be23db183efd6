//! SQLite-backed key/value store
//!
//! Durable backend for breaker state so counters survive restarts and are
//! visible to every process on the host that opens the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;

use crate::error::{Result, RsError};
use crate::storage::kv::KeyValueStore;
use crate::storage::migrations;
use crate::utils::clock::{Clock, checked_after};

/// SQLite key/value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    schema_version: u32,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open the store at the given path, creating parent directories.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            schema_version,
            clock,
        };
        let purged = store.purge_expired()?;
        if purged > 0 {
            tracing::debug!(purged, path = %path.display(), "purged expired state entries");
        }
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            schema_version,
            clock,
        })
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run SQLite's integrity check.
    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<i64> {
        ttl.and_then(|ttl| checked_after(self.clock.now(), ttl))
            .map(|at| at.timestamp_millis())
    }
}

fn decode(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(RsError::from)
}

impl KeyValueStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store
                 WHERE namespace = ?1 AND key = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
                params![namespace, key, now],
                |row| row.get(0),
            )
            .optional()?;
        raw.as_deref().map(decode).transpose()
    }

    fn set(&self, namespace: &str, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now_millis();
        let expires_at = self.expiry(ttl);
        let encoded = serde_json::to_string(&value)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_store (namespace, key, value, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![namespace, key, encoded, expires_at, now],
        )?;
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock();
        let live: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM kv_store
                 WHERE namespace = ?1 AND key = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
                params![namespace, key, now],
                |row| row.get(0),
            )?;
        conn.execute(
            "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(live)
    }

    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_store
             WHERE namespace = ?1 AND substr(key, 1, length(?2)) = ?2
               AND (expires_at IS NULL OR expires_at > ?3)
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![namespace, prefix, now], |row| row.get(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Atomic across processes: the read and write share one IMMEDIATE
    /// transaction, so concurrent writers serialize on SQLite's lock.
    fn increment(&self, namespace: &str, key: &str, delta: i64) -> Result<i64> {
        let now = self.clock.now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT value FROM kv_store
                 WHERE namespace = ?1 AND key = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
                params![namespace, key, now],
                |row| row.get(0),
            )
            .optional()?;
        let current = match raw.as_deref() {
            Some(raw) => decode(raw)?.as_i64().unwrap_or(0),
            None => 0,
        };
        let next = current.saturating_add(delta);
        tx.execute(
            "INSERT INTO kv_store (namespace, key, value, expires_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                expires_at = NULL,
                updated_at = excluded.updated_at",
            params![namespace, key, next.to_string(), now],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
