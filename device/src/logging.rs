//! Logging setup for gateway processes
//!
//! The library itself only emits `tracing` events. Binaries embedding the
//! gateway core call [`init_logging`] or [`init_logging_from_env`] once at
//! startup to install a subscriber.

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Selects the log mode
pub const LOG_MODE_ENV: &str = "GATEWAY_LOG_MODE";

/// Overrides the filter directive, taking precedence over `RUST_LOG`
pub const LOG_LEVEL_ENV: &str = "GATEWAY_LOG_LEVEL";

/// How log output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// No subscriber is installed
    #[default]
    Silent,
    /// Compact single-line output on stderr
    Development,
    /// Pretty output with thread ids and source locations
    Debug,
    /// One JSON object per line, for log shippers
    Structured,
}

impl FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" | "" => Ok(LoggingMode::Silent),
            "development" | "dev" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            "structured" | "json" => Ok(LoggingMode::Structured),
            _ => Err(LoggingError::InvalidEnv(format!("{LOG_MODE_ENV}={value}"))),
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install a global subscriber for `mode`.
///
/// # Examples
///
/// ```rust,ignore
/// device::logging::init_logging(LoggingMode::Development)?;
/// ```
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let result = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .with(create_env_filter("info"))
            .try_init(),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(create_env_filter("debug"))
            .try_init(),
        LoggingMode::Structured => Registry::default()
            .with(fmt::layer().json().with_current_span(false))
            .with(create_env_filter("info"))
            .try_init(),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Install a subscriber according to `GATEWAY_LOG_MODE`.
///
/// An unset variable means [`LoggingMode::Silent`]; an unrecognized value is
/// an error rather than a silent fallback.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var(LOG_MODE_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LoggingMode::Silent,
    };

    init_logging(mode)
}

/// `GATEWAY_LOG_LEVEL`, then `RUST_LOG`, then `default_level`
fn create_env_filter(default_level: &str) -> EnvFilter {
    std::env::var(LOG_LEVEL_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("silent", LoggingMode::Silent)]
    #[case("", LoggingMode::Silent)]
    #[case("Development", LoggingMode::Development)]
    #[case("dev", LoggingMode::Development)]
    #[case("DEBUG", LoggingMode::Debug)]
    #[case("json", LoggingMode::Structured)]
    #[case(" structured ", LoggingMode::Structured)]
    fn test_parse_mode(#[case] value: &str, #[case] expected: LoggingMode) {
        assert_eq!(value.parse::<LoggingMode>().unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid_mode() {
        let error = "verbose".parse::<LoggingMode>().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid environment variable: GATEWAY_LOG_MODE=verbose"
        );
    }

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
        assert_eq!(LoggingMode::default(), LoggingMode::Silent);
    }
}
