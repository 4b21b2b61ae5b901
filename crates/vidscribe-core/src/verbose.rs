//! Verbose logging support for debugging vidscribe operations.
//!
//! Use `set_verbose(true)` to enable verbose output, then use `verbose!()` macro
//! to emit debug records through the `log` facade.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable or disable verbose logging
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::SeqCst);
}

/// Check if verbose logging is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Log a formatted debug message if verbose mode is enabled
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::verbose::is_verbose() {
            ::log::debug!($($arg)*);
        }
    };
}
