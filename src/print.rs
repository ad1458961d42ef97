//! Logging setup and node-id-prefixed print macros.
//!
//! Every log line carries the owning node's ID so that multi-node test
//! runs (and a real multi-process deployment's aggregated logs) can be
//! told apart at a glance.

use std::sync::OnceLock;

/// The current node's ID, set once at startup and read by the `pf_*!`
/// macros. Falls back to `"?"` if read before [`set_me`] is called.
static ME: OnceLock<String> = OnceLock::new();

/// Records this process's node ID for use as a log line prefix. Must be
/// called at most once; subsequent calls are ignored.
pub fn set_me(node_id: &str) {
    let _ = ME.set(node_id.to_string());
}

/// Returns the current node's ID prefix, or `"?"` if unset.
pub fn me() -> &'static str {
    ME.get().map(String::as_str).unwrap_or("?")
}

/// Initializes the `env_logger` backend. Safe to call more than once.
pub fn logger_init() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}

#[macro_export]
macro_rules! pf_trace {
    ($($arg:tt)*) => {
        log::trace!("{:>9} | {}", $crate::print::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_debug {
    ($($arg:tt)*) => {
        log::debug!("{:>9} | {}", $crate::print::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_info {
    ($($arg:tt)*) => {
        log::info!("{:>9} | {}", $crate::print::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_warn {
    ($($arg:tt)*) => {
        log::warn!("{:>9} | {}", $crate::print::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_error {
    ($($arg:tt)*) => {
        log::error!("{:>9} | {}", $crate::print::me(), format!($($arg)*))
    };
}
