//! Runtime configuration.

use crate::errors::TeardownError;
use crate::reporting::ReporterKind;
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`TeardownConfig::from_env`].
pub const ENV_PREFIX: &str = "TEARDOWN_";

/// Configuration shared by every context of a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownConfig {
    /// Where callback failures are reported.
    #[serde(default)]
    pub reporter: ReporterKind,
    /// Catch panicking callbacks and report them like returned errors.
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
    /// Turn a failing callback into a nonzero process exit status.
    #[serde(default)]
    pub escalate_failures: bool,
    /// Exit status used when escalating failures.
    #[serde(default = "default_failure_exit_code")]
    pub failure_exit_code: i32,
    /// Upper bound on simultaneously live isolated contexts.
    #[serde(default)]
    pub max_isolated_contexts: Option<usize>,
}

fn default_catch_panics() -> bool {
    true
}

fn default_failure_exit_code() -> i32 {
    1
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterKind::default(),
            catch_panics: default_catch_panics(),
            escalate_failures: false,
            failure_exit_code: default_failure_exit_code(),
            max_isolated_contexts: None,
        }
    }
}

impl TeardownConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: ReporterKind) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets whether panics are caught.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Enables failure escalation with the given exit status.
    #[must_use]
    pub fn with_escalation(mut self, exit_code: i32) -> Self {
        self.escalate_failures = true;
        self.failure_exit_code = exit_code;
        self
    }

    /// Sets the isolated context limit.
    #[must_use]
    pub fn with_max_isolated_contexts(mut self, max: usize) -> Self {
        self.max_isolated_contexts = Some(max);
        self
    }

    /// Parses a JSON configuration document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, TeardownError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TeardownError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `TEARDOWN_*` environment variables.
    pub fn from_env() -> Result<Self, TeardownError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a configuration from `(name, value)` pairs.
    ///
    /// Recognized names: `TEARDOWN_REPORTER`, `TEARDOWN_CATCH_PANICS`,
    /// `TEARDOWN_ESCALATE_FAILURES`, `TEARDOWN_FAILURE_EXIT_CODE` and
    /// `TEARDOWN_MAX_ISOLATED_CONTEXTS`. Anything else is ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, TeardownError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();

            match name {
                "REPORTER" => {
                    config.reporter = value.parse().map_err(TeardownError::Config)?;
                }
                "CATCH_PANICS" => config.catch_panics = parse_bool(name, value)?,
                "ESCALATE_FAILURES" => config.escalate_failures = parse_bool(name, value)?,
                "FAILURE_EXIT_CODE" => {
                    config.failure_exit_code = value.parse().map_err(|_| {
                        TeardownError::Config(format!("invalid {ENV_PREFIX}{name}: '{value}'"))
                    })?;
                }
                "MAX_ISOLATED_CONTEXTS" => {
                    config.max_isolated_contexts = Some(value.parse().map_err(|_| {
                        TeardownError::Config(format!("invalid {ENV_PREFIX}{name}: '{value}'"))
                    })?);
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for contradictions.
    pub fn validate(&self) -> Result<(), TeardownError> {
        if self.escalate_failures && self.failure_exit_code == 0 {
            return Err(TeardownError::Config(
                "failure_exit_code must be nonzero when escalate_failures is set".to_string(),
            ));
        }
        if self.max_isolated_contexts == Some(0) {
            return Err(TeardownError::Config(
                "max_isolated_contexts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, TeardownError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TeardownError::Config(format!(
            "invalid {ENV_PREFIX}{name}: '{value}'"
        ))),
    }
}
