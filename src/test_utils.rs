//! Shared helpers for tests.
//!
//! - Consistent tracing-based logging initialization
//! - Phase/completion macros for readable test output
//! - A global lock for tests that install a process-wide scheduler
//!
//! # Example
//!
//! ```
//! use tidings::test_utils::init_test_logging;
//!
//! init_test_logging();
//! tidings::test_phase!("roundtrip");
//! ```

use std::sync::Once;

use parking_lot::{Mutex, MutexGuard};

static INIT_LOGGING: Once = Once::new();
static SCHEDULER_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only the first call initializes.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Serializes tests that install a process-wide scheduler.
///
/// [`crate::run`] refuses to nest, so concurrent tests in one binary must
/// take this lock around their `run` call.
pub fn scheduler_lock() -> MutexGuard<'static, ()> {
    SCHEDULER_LOCK.lock()
}

/// Log a test phase transition.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(phase = %$name, "==== TEST PHASE: {} ====", $name);
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = %$name, "test completed successfully: {}", $name);
    };
}
