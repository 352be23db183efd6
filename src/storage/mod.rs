//! Storage layer for resilient-search
//!
//! Durable breaker state lives behind [`KeyValueStore`]: [`SqliteStore`] for
//! production, [`MemoryStore`] for tests and single-process use.

pub mod kv;
pub mod migrations;
pub mod sqlite;

pub use kv::{KeyValueStore, MemoryStore};
pub use sqlite::SqliteStore;
