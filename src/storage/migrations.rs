//! Database migrations

use rusqlite::Connection;

use crate::error::{Result, RsError};

const MIGRATIONS: [&str; 1] = [include_str!("../../migrations/001_kv_store.sql")];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Run all pending migrations, tracking progress in `PRAGMA user_version`.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| RsError::Storage(format!("read user_version: {err}")))?;

    if current_version > SCHEMA_VERSION {
        return Err(RsError::Storage(format!(
            "state store schema {current_version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = (idx + 1) as u32;
        if current_version >= target_version {
            continue;
        }

        conn.execute_batch(sql).map_err(|err| {
            RsError::Storage(format!("migration {target_version} failed: {err}"))
        })?;
        conn.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                RsError::Storage(format!("failed to set user_version {target_version}: {err}"))
            })?;
        tracing::debug!(version = target_version, "applied state store migration");
    }

    Ok(SCHEMA_VERSION)
}
