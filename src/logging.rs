//! Logging setup for binaries and the test suite.

use tracing_subscriber::EnvFilter;

/// Setup logging of events reported by the crate and the test suite.
///
/// Use the RUST_LOG environment variable to override the defaults.
///
/// E.g. to enable debug level logging:
///   RUST_LOG=DEBUG
///
/// Or to log only the steps processed by the harness:
///   RUST_LOG=zoneprobe::harness=DEBUG
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}
