//! Reporting of callback failures.
//!
//! A drain never propagates a callback's error to its caller; every failure
//! goes to an [`ErrorReporter`] instead. Which reporter a context uses is
//! picked by [`ReporterKind`] in the configuration or injected directly.

mod sink;

pub use sink::{CollectingReporter, ErrorReporter, NoOpReporter, StderrReporter, TracingReporter};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Built-in reporter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReporterKind {
    /// Print to standard error.
    #[default]
    Stderr,
    /// Log through `tracing`.
    Tracing,
    /// Drop reports.
    None,
}

impl ReporterKind {
    /// Instantiates the selected reporter.
    #[must_use]
    pub fn build(self) -> Arc<dyn ErrorReporter> {
        match self {
            Self::Stderr => Arc::new(StderrReporter),
            Self::Tracing => Arc::new(TracingReporter),
            Self::None => Arc::new(NoOpReporter),
        }
    }
}

impl fmt::Display for ReporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Tracing => write!(f, "tracing"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for ReporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" => Ok(Self::Stderr),
            "tracing" | "log" => Ok(Self::Tracing),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown reporter '{other}'")),
        }
    }
}
