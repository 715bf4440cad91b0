//! Error reporter trait and implementations.

use crate::context::ContextId;
use crate::errors::CallbackInvocationError;
use std::io::Write;
use tracing::warn;

/// Receives callback failures as they happen during a drain.
///
/// Reporting must never fail or panic; errors writing the report are
/// swallowed.
pub trait ErrorReporter: Send + Sync {
    /// Reports a single failed callback.
    fn report(&self, context: ContextId, error: &CallbackInvocationError);
}

/// Writes failures to the process's standard error stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report(&self, _context: ContextId, error: &CallbackInvocationError) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "Exception ignored in exit callback {}:", error.callback);
        let _ = writeln!(stderr, "{}", error.message);
        let _ = stderr.flush();
    }
}

/// Logs failures through `tracing` at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: ContextId, error: &CallbackInvocationError) {
        warn!(
            context = %context,
            callback = %error.callback,
            panicked = error.panicked,
            "Exception ignored in exit callback: {}",
            error.message
        );
    }
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl ErrorReporter for NoOpReporter {
    fn report(&self, _context: ContextId, _error: &CallbackInvocationError) {
        // Intentionally empty
    }
}

/// Keeps every report in memory, for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: parking_lot::RwLock<Vec<(ContextId, CallbackInvocationError)>>,
}

impl CollectingReporter {
    /// Creates a new collecting reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected reports.
    #[must_use]
    pub fn reports(&self) -> Vec<(ContextId, CallbackInvocationError)> {
        self.reports.read().clone()
    }

    /// Returns the names of the failing callbacks, in report order.
    #[must_use]
    pub fn callbacks(&self) -> Vec<String> {
        self.reports
            .read()
            .iter()
            .map(|(_, e)| e.callback.clone())
            .collect()
    }

    /// Returns the number of collected reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    /// Clears all collected reports.
    pub fn clear(&self) {
        self.reports.write().clear();
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, context: ContextId, error: &CallbackInvocationError) {
        self.reports.write().push((context, error.clone()));
    }
}
