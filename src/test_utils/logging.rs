use std::fmt::Debug;
use std::sync::Once;
use std::time::Instant;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// `RUST_LOG` overrides the default `warn,posematch=debug` filter.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,posematch=debug"));
        // another harness may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

pub struct TestLogger {
    test_name: String,
    start_time: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        init_test_tracing();
        let separator = "=".repeat(60);
        println!("\n{separator}");
        println!("[TEST START] {test_name}");
        println!("{separator}");
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn log_input<T: Debug>(&self, name: &str, value: &T) {
        println!("[INPUT] {name}: {value:?}");
    }

    pub fn log_expected<T: Debug>(&self, value: &T) {
        println!("[EXPECTED] {value:?}");
    }

    pub fn log_actual<T: Debug>(&self, value: &T) {
        println!("[ACTUAL] {value:?}");
    }

    pub fn pass(&self) {
        println!("[RESULT] PASSED {} in {:?}", self.test_name, self.start_time.elapsed());
        println!("{}\n", "=".repeat(60));
    }

    pub fn fail(&self, reason: &str) {
        println!("[RESULT] FAILED {} in {:?}", self.test_name, self.start_time.elapsed());
        println!("[REASON] {reason}");
        println!("{}\n", "=".repeat(60));
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }
}
