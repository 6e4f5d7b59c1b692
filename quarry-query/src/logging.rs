//! Logging setup for Quarry.
//!
//! Quarry emits `tracing` events everywhere (compiled SQL, include scopes,
//! diagnostics). This module only installs a subscriber when asked to via
//! environment variables.
//!
//! # Environment Variables
//!
//! - `QUARRY_DEBUG=true|1|yes` - Enable debug logging
//! - `QUARRY_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust,no_run
//! use quarry_query::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `QUARRY_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUARRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `QUARRY_LOG_LEVEL`.
///
/// Defaults to "debug" if `QUARRY_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("QUARRY_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `QUARRY_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("QUARRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Build the filter directive string for all Quarry crates at `level`.
pub fn filter_directives(level: &str) -> String {
    format!(
        "quarry={},quarry_query={},quarry_sqlite={}",
        level, level, level
    )
}

/// Initialize the Quarry logging system.
///
/// Subsequent calls are no-ops. Without the `tracing-subscriber` feature this
/// does nothing and events go to whatever subscriber the application installs.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUARRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(filter_directives(level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "Quarry logging initialized"
            );
        }
    });
}

/// Debug logging gated on `QUARRY_DEBUG` at runtime.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

/// Trace logging gated on `QUARRY_DEBUG` at runtime.
#[macro_export]
macro_rules! quarry_trace {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::trace!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_cover_all_crates() {
        let directives = filter_directives("debug");
        assert!(directives.contains("quarry=debug"));
        assert!(directives.contains("quarry_query=debug"));
        assert!(directives.contains("quarry_sqlite=debug"));
    }

    #[test]
    fn test_log_level_default() {
        // SAFETY: Test runs in isolation
        unsafe {
            env::remove_var("QUARRY_DEBUG");
            env::remove_var("QUARRY_LOG_LEVEL");
        }
        assert_eq!(get_log_level(), "warn");
    }
}
