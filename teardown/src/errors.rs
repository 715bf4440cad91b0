//! Error types for the teardown registry.
//!
//! Individual callback failures never abort a drain; they are reported as they
//! happen and the last one is surfaced as [`CallbackInvocationError`] once the
//! drain finishes. Whether that turns into a nonzero exit status is up to the
//! host.

use crate::context::ContextId;
use crate::lifecycle::LifecycleState;
use std::any::Any;
use thiserror::Error;

/// Result type returned by callback bodies.
pub type CallbackResult = anyhow::Result<()>;

/// The main error type for teardown operations.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// A registration was attempted after the owning context terminated.
    #[error("{0}")]
    Registration(#[from] RegistrationError),

    /// At least one callback failed during a drain.
    #[error("{0}")]
    CallbackInvocation(#[from] CallbackInvocationError),

    /// Shutdown was requested for a context that already went through it.
    #[error("Context {0} already torn down")]
    AlreadyTerminated(ContextId),

    /// The runtime does not know the requested context.
    #[error("Unknown execution context: {0}")]
    UnknownContext(ContextId),

    /// The runtime refused to create another isolated context.
    #[error("Isolated context limit ({0}) reached")]
    ContextLimit(usize),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The blocking task running a teardown was cancelled.
    #[error("Teardown task failed: {0}")]
    Join(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when registering against a context that has been torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot register callback {callback}: context {context} already torn down ({state})")]
pub struct RegistrationError {
    /// The context the registration was aimed at.
    pub context: ContextId,
    /// Display name of the rejected callable.
    pub callback: String,
    /// The lifecycle state observed at registration time.
    pub state: LifecycleState,
}

impl RegistrationError {
    /// Creates a new registration error.
    #[must_use]
    pub fn new(context: ContextId, callback: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            context,
            callback: callback.into(),
            state,
        }
    }
}

/// Error describing a callback that failed while being invoked.
///
/// When returned from a drain it describes the *last* failure and `failed`
/// holds the total number of failing callbacks in that drain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Exception ignored in exit callback {callback}: {message}")]
pub struct CallbackInvocationError {
    /// Display name of the failing callable.
    pub callback: String,
    /// Rendered error, including its cause chain.
    pub message: String,
    /// True if the callback panicked rather than returning an error.
    pub panicked: bool,
    /// Number of failures in the drain that produced this error.
    pub failed: usize,
}

impl CallbackInvocationError {
    /// Builds an invocation error from a callback's returned error.
    #[must_use]
    pub fn from_error(callback: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            callback: callback.into(),
            // `{:#}` renders the whole context chain on one line.
            message: format!("{error:#}"),
            panicked: false,
            failed: 1,
        }
    }

    /// Builds an invocation error from a caught panic payload.
    #[must_use]
    pub fn from_panic(callback: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };

        Self {
            callback: callback.into(),
            message: format!("panicked: {message}"),
            panicked: true,
            failed: 1,
        }
    }

    /// Sets the failure count.
    #[must_use]
    pub fn with_failed(mut self, failed: usize) -> Self {
        self.failed = failed;
        self
    }
}
