//! `tracing-subscriber` installation.

use crate::errors::TeardownError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Installs a global subscriber writing to stderr, filtered by `directives`
/// (e.g. `"teardown=debug,warn"`).
///
/// Logs go to stderr so they never interleave with callback output on
/// stdout.
///
/// # Errors
///
/// Fails if the directives don't parse or a global subscriber is already
/// installed.
pub fn init_logging(format: LogFormat, directives: &str) -> Result<(), TeardownError> {
    let filter =
        EnvFilter::try_new(directives).map_err(|e| TeardownError::Config(e.to_string()))?;
    install(format, filter)
}

/// Like [`init_logging`], but `RUST_LOG` wins over `default_directives`.
pub fn init_logging_from_env(
    format: LogFormat,
    default_directives: &str,
) -> Result<(), TeardownError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .map_err(|e| TeardownError::Config(e.to_string()))?;
    install(format, filter)
}

fn install(format: LogFormat, filter: EnvFilter) -> Result<(), TeardownError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| TeardownError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_invalid_directives_are_rejected() {
        assert!(init_logging(LogFormat::Text, "teardown=notalevel").is_err());
    }
}
