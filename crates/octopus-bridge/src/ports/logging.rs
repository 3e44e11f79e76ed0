//! Logging port

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained tracing output
    Trace,
    /// Plain log output (`log` level in scripts)
    Log,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

impl LogLevel {
    /// Script-facing name of this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Log => "log",
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

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" | "debug" => Ok(Self::Trace),
            "log" => Ok(Self::Log),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown log level: {other}")),
        }
    }
}

/// Logging capability consumed by the engine
///
/// Logging is best effort: implementations must not panic and have no way
/// to report failure.
pub trait LogSystem: Send + Sync + fmt::Debug {
    /// Record `message` at `level`; `source` names where it came from
    fn log(&self, level: LogLevel, message: &str, source: &str);
}

/// Default [`LogSystem`] forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLogSystem;

impl LogSystem for DefaultLogSystem {
    fn log(&self, level: LogLevel, message: &str, source: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(source, "{message}"),
            LogLevel::Log => tracing::debug!(source, "{message}"),
            LogLevel::Info => tracing::info!(source, "{message}"),
            LogLevel::Warn => tracing::warn!(source, "{message}"),
            LogLevel::Error => tracing::error!(source, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_ordering_and_names() {
        assert!(LogLevel::Trace < LogLevel::Error);
        assert_eq!(LogLevel::Log.to_string(), "log");
    }

    #[test]
    fn test_default_log_system_never_fails() {
        let log = DefaultLogSystem;
        log.log(LogLevel::Error, "something broke", "test");
        log.log(LogLevel::Trace, "", "");
    }
}
