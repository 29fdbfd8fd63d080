//! Process-wide logging setup shared by binaries and tests.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Install the default subscriber: JSON lines, filtered by `RUST_LOG`
/// (falling back to `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    crate::tracing::install(&LogSettings::default());
}

/// Compact, human-readable output captured by the test harness.
pub fn init_for_tests() {
    crate::tracing::install(&LogSettings::for_tests());
}
