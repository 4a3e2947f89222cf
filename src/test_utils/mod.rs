//! Shared test utilities for posematch.

pub mod fixtures;
pub mod logging;

#[cfg(test)]
pub mod arbitrary;

/// Table-driven test case structure.
#[derive(Debug, Clone)]
pub struct TestCase<I, E> {
    pub name: &'static str,
    pub input: I,
    pub expected: E,
    pub should_panic: bool,
}

impl<I, E> TestCase<I, E> {
    pub const fn new(name: &'static str, input: I, expected: E) -> Self {
        Self {
            name,
            input,
            expected,
            should_panic: false,
        }
    }

    /// A case whose input violates a precondition.
    pub const fn panics(name: &'static str, input: I, expected: E) -> Self {
        Self {
            name,
            input,
            expected,
            should_panic: true,
        }
    }
}

/// Run table-driven tests with detailed logging.
pub fn run_table_tests<I, E, F>(cases: Vec<TestCase<I, E>>, test_fn: F)
where
    I: std::fmt::Debug + Clone,
    E: std::fmt::Debug + PartialEq,
    F: Fn(I) -> E,
{
    logging::init_test_tracing();
    for case in cases {
        let start = std::time::Instant::now();
        println!("[TEST] Running: {}", case.name);
        println!("[TEST] Input: {:?}", case.input);

        let input = case.input.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| test_fn(input)));
        let elapsed = start.elapsed();

        if case.should_panic {
            assert!(result.is_err(), "Test '{}' expected panic", case.name);
            println!("[TEST] Expected panic occurred");
            println!("[TEST] PASSED: {} ({:?})\n", case.name, elapsed);
            continue;
        }

        let actual = result.unwrap_or_else(|_| {
            panic!("Test '{}' panicked unexpectedly", case.name);
        });

        println!("[TEST] Expected: {:?}", case.expected);
        println!("[TEST] Actual: {:?}", actual);
        println!("[TEST] Timing: {:?}", elapsed);

        assert_eq!(actual, case.expected, "Test '{}' failed", case.name);
        println!("[TEST] PASSED: {} ({:?})\n", case.name, elapsed);
    }
}
