//! Logging setup.
//!
//! The crate only emits `tracing` events; applications decide where they go.
//! [`init_logging_with_config`] installs a formatted subscriber filtered by
//! `RUST_LOG` when set, or by the configured level otherwise.

use std::fmt;

use thiserror::Error;
use tracing_subscriber::{fmt as tsfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed, or the filter is invalid.
    #[error("failed to initialize logging: {0}")]
    InitializationFailed(String),
}

/// Minimum level shown when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Per-message detail.
    Debug,
    /// Lifecycle events.
    #[default]
    Info,
    /// Dropped messages and failed sends.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the logging subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default minimum level.
    pub level: LogLevel,
    /// Whether to include timestamps.
    pub with_timestamp: bool,
    /// Whether to include the emitting module.
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create a config with the given level.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set whether to include timestamps.
    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    /// Set whether to include the emitting module.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Install the default subscriber (info level, timestamps, targets).
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install a subscriber with the given configuration.
///
/// Fails if a global subscriber is already set.
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let layer = tsfmt::layer().with_target(config.with_target);
    let registry = tracing_subscriber::registry().with(config.filter());

    let result = if config.with_timestamp {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.without_time()).try_init()
    };
    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.with_timestamp);
        assert!(config.with_target);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_timestamp(false)
            .with_target(false);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamp);
        assert!(!config.with_target);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging_with_config(LogConfig::new(LogLevel::Warn).with_timestamp(false));
        assert!(matches!(
            init_logging(),
            Err(LoggingError::InitializationFailed(_))
        ));
    }
}
