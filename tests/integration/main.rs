//! Integration tests: components wired together over real stores.

mod breaker_persistence;
mod pipeline_flow;
mod recovery_flow;
