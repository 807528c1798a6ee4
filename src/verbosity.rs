//! # Process-wide verbosity counter.
//!
//! Debug output of the broker is gated by a single counter that can be changed
//! at runtime through the diagnostic dump (`-v <level>`).
//!
//! - level `>= 1`: connect/disconnect traces ([`log1!`](crate::log1))
//! - level `>= 2`: per-lookup and per-sound traces ([`log2!`](crate::log2))

use std::sync::atomic::{AtomicI32, Ordering};

static LEVEL: AtomicI32 = AtomicI32::new(0);

/// Sets the verbosity level.
pub fn set_level(level: i32) {
    LEVEL.store(level, Ordering::Relaxed);
}

/// Returns the current verbosity level.
pub fn level() -> i32 {
    LEVEL.load(Ordering::Relaxed)
}

/// True if traces of the given level should be emitted.
#[inline]
pub fn enabled(at: i32) -> bool {
    level() >= at
}

/// Emits a `tracing::debug!` event when verbosity is at least 1.
#[macro_export]
macro_rules! log1 {
    ($($arg:tt)*) => {
        if $crate::verbosity::enabled(1) {
            ::tracing::debug!($($arg)*);
        }
    };
}

/// Emits a `tracing::debug!` event when verbosity is at least 2.
#[macro_export]
macro_rules! log2 {
    ($($arg:tt)*) => {
        if $crate::verbosity::enabled(2) {
            ::tracing::debug!($($arg)*);
        }
    };
}
