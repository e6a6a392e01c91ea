//! Tracing and logging (shared setup for binaries and test harnesses).

/// Initialize process-wide tracing/logging with the default filter (`info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}

/// Tracing configuration (filters, layers).
pub mod tracing;
