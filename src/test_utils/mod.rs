//! Shared test utilities for resilient-search.
//!
//! Public so integration tests under `tests/` can reuse the same fixtures.

pub mod fixtures;
pub mod logging;

pub use fixtures::{ScriptedDependency, StateFixture};
pub use logging::TestLogger;

/// Table-driven test case.
#[derive(Debug, Clone)]
pub struct TestCase<I, E> {
    pub name: &'static str,
    pub input: I,
    pub expected: E,
}

impl<I, E> TestCase<I, E> {
    pub const fn new(name: &'static str, input: I, expected: E) -> Self {
        Self { name, input, expected }
    }
}

/// Run each case through `test_fn`, naming the failing case on mismatch.
pub fn run_table_tests<I, E, A, F>(cases: &[TestCase<I, E>], test_fn: F)
where
    I: std::fmt::Debug,
    E: std::fmt::Debug,
    A: std::fmt::Debug + PartialEq<E>,
    F: Fn(&I) -> A,
{
    for case in cases {
        let actual = test_fn(&case.input);
        tracing::debug!(case = case.name, input = ?case.input, actual = ?actual, "table case");
        assert_eq!(actual, case.expected, "case '{}' failed for input {:?}", case.name, case.input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_runner_passes_matching_cases() {
        let cases = [TestCase::new("double", 2, 4), TestCase::new("zero", 0, 0)];
        run_table_tests(&cases, |n| n * 2);
    }

    #[test]
    #[should_panic(expected = "case 'wrong'")]
    fn table_runner_names_failing_case() {
        let cases = [TestCase::new("wrong", 1, 3)];
        run_table_tests(&cases, |n| n * 2);
    }
}
