//! Logging utilities and structured logging support
//!
//! The library only emits through the `log` facade. Binaries and tests that want
//! output call [`init`] (or [`init_for_tests`]) once.

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging for unit tests; safe to call from every test
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
