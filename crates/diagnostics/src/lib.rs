// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging facade shared by every records mover crate.
//!
//! Output is controlled by the `MVREC_LOG` environment variable:
//! - `off` (default) - no logs
//! - `error`, `warn`, `info`, `debug` - minimum level written to stderr

use std::sync::Once;

// Re-export emit so the macros below resolve from any crate
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV_VAR: &str = "MVREC_LOG";

static INIT: Once = Once::new();

/// Parsed value of `MVREC_LOG`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Level(emit::Level),
    /// Unrecognised value; treated as `info`
    Unknown,
}

/// Interpret a `MVREC_LOG` value
#[must_use]
pub fn parse_log_setting(value: &str) -> LogSetting {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "none" => LogSetting::Off,
        "debug" => LogSetting::Level(emit::Level::Debug),
        "info" => LogSetting::Level(emit::Level::Info),
        "warn" | "warning" => LogSetting::Level(emit::Level::Warn),
        "error" => LogSetting::Level(emit::Level::Error),
        _ => LogSetting::Unknown,
    }
}

/// Initialize diagnostics from `MVREC_LOG`.
///
/// Call once at startup; later calls are ignored.
pub fn init_diagnostics() {
    let value = std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| "off".to_string());
    init_with_setting(parse_log_setting(&value), &value);
}

/// Initialize diagnostics with an explicit minimum level, ignoring the environment.
pub fn init_with_level(level: emit::Level) {
    init_with_setting(LogSetting::Level(level), "");
}

fn init_with_setting(setting: LogSetting, raw: &str) {
    INIT.call_once(|| {
        let level = match setting {
            LogSetting::Off => return,
            LogSetting::Level(level) => level,
            LogSetting::Unknown => emit::Level::Info,
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if setting == LogSetting::Unknown {
            emit::warn!("Unknown {var} value {value}, using info", var: LOG_ENV_VAR, value: raw);
        }

        // The runtime lives for the whole process
        std::mem::forget(rt);
    });
}

/// Log an operation users want to see in normal runs
/// (strategy chosen, files written, rows loaded).
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detail useful when debugging a move (hints consumed, SQL issued).
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log a recoverable condition (lenient hint handling, weakened semantics).
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log a failure that aborts a move.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Short form of [`log_info!`]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Short form of [`log_debug!`]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Short form of [`log_warn!`]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Short form of [`log_error!`]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_setting() {
        assert_eq!(parse_log_setting("off"), LogSetting::Off);
        assert_eq!(parse_log_setting(""), LogSetting::Off);
        assert_eq!(
            parse_log_setting("DEBUG"),
            LogSetting::Level(emit::Level::Debug)
        );
        assert_eq!(
            parse_log_setting("warning"),
            LogSetting::Level(emit::Level::Warn)
        );
        assert_eq!(parse_log_setting("chatty"), LogSetting::Unknown);
    }

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_diagnostics();
        init_with_level(emit::Level::Error);
    }

    #[test]
    fn test_macros_compile() {
        log_info!("Test message");
        log_debug!("Debug message with {value}", value: 42);
        info!("Moved {count} rows", count: 3);
        warn!("Hint {hint} left unhandled", hint: "escape");
        error!("Load failed");
        debug!("SQL: {sql}", sql: "SELECT 1");
    }
}
