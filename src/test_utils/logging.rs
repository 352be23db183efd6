//! Test logging: route `tracing` output through the test harness.

use std::sync::Once;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per process. `RUST_LOG` applies.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resilient_search=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Brackets a test with start/finish events and elapsed time.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        init();
        tracing::info!(test = test_name, "test start");
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn step(&self, what: &str) {
        tracing::info!(test = %self.test_name, elapsed_ms = self.elapsed_ms(), "{what}");
    }

    pub fn observe<T: std::fmt::Debug>(&self, name: &str, value: &T) {
        tracing::debug!(test = %self.test_name, name, value = ?value, "observed");
    }

    pub fn pass(&self) {
        tracing::info!(test = %self.test_name, elapsed_ms = self.elapsed_ms(), "test passed");
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}
