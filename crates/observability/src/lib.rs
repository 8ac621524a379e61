//! Tracing and logging (shared setup).

/// Initialize process-wide tracing with defaults (`info`, JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{init_with, LogFormat, ParseLogFormatError};
