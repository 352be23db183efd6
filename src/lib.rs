pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod resilience;
pub mod search;
pub mod storage;
pub mod test_utils;
pub mod utils;

pub use error::{Result, RsError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
