#![deny(missing_docs)]
//! Shared logging utilities for the novelmill workspace.
//!
//! This crate provides the `mill_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the ordinal of the chapter currently being
    /// processed by the download loop.
    static CHAPTER_ORDINAL: Cell<u64> = const { Cell::new(0) };
}

/// Sets the current chapter ordinal for the current thread.
/// The driver loop calls this once per chapter before processing it.
pub fn set_chapter_ordinal(ordinal: u64) {
    CHAPTER_ORDINAL.with(|v| v.set(ordinal));
}

/// Retrieves the current chapter ordinal for the current thread.
/// Returns 0 if no chapter has been started yet.
pub fn get_chapter_ordinal() -> u64 {
    CHAPTER_ORDINAL.with(|v| v.get())
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! mill_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! mill_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! mill_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! mill_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! mill_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
