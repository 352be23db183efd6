//! Isolated state for tests: a temp dir, a manual clock, and stores on both.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::{Result, RsError};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};
use crate::utils::clock::{Clock, ManualClock};

/// Temp directory plus a shared [`ManualClock`].
pub struct StateFixture {
    pub temp_dir: TempDir,
    pub clock: Arc<ManualClock>,
}

impl StateFixture {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        tracing::debug!(path = %temp_dir.path().display(), "fixture created");
        Ok(Self {
            temp_dir,
            clock: Arc::new(ManualClock::new()),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.temp_dir.path().join("state.db")
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn memory_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new(self.clock()))
    }

    /// Open (or reopen) the fixture's SQLite store.
    pub fn sqlite_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(Arc::new(SqliteStore::open(self.sqlite_path(), self.clock())?))
    }

    pub fn breaker(&self, dependency: &str, config: CircuitBreakerConfig, store: Arc<dyn KeyValueStore>) -> CircuitBreaker {
        CircuitBreaker::new(dependency, config, store, self.clock())
    }

    pub fn registry(&self, store: Arc<dyn KeyValueStore>) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(store, self.clock())
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}

/// Dependency that replays a fixed script of outcomes, then succeeds.
#[derive(Debug, Default)]
pub struct ScriptedDependency {
    script: Mutex<VecDeque<std::result::Result<(), RsError>>>,
    calls: Mutex<u32>,
}

impl ScriptedDependency {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then_fail(self, error: RsError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    #[must_use]
    pub fn then_fail_times(self, times: usize, error: impl Fn() -> RsError) -> Self {
        {
            let mut script = self.script.lock();
            for _ in 0..times {
                script.push_back(Err(error()));
            }
        }
        self
    }

    #[must_use]
    pub fn then_succeed(self) -> Self {
        self.script.lock().push_back(Ok(()));
        self
    }

    /// One call: the next scripted outcome, or success when exhausted.
    pub fn call(&self) -> Result<u32> {
        let mut calls = self.calls.lock();
        *calls += 1;
        let outcome = self.script.lock().pop_front().unwrap_or(Ok(()));
        outcome.map(|()| *calls)
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}
