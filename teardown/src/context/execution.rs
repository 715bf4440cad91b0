//! Execution contexts owning a callback registry.

use super::{ContextId, ContextKind};
use crate::callback::{Callback, Kwargs};
use crate::config::TeardownConfig;
use crate::errors::{RegistrationError, TeardownError};
use crate::lifecycle::{ContextLifecycleHook, LifecycleState};
use crate::registry::{CallbackRegistry, DrainSummary};
use crate::reporting::ErrorReporter;
use crate::utils::iso_timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Serializable snapshot of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    /// Context id.
    pub id: ContextId,
    /// Process or isolated.
    #[serde(flatten)]
    pub kind: ContextKind,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Pending callbacks.
    pub pending: usize,
    /// When the context was created (ISO 8601).
    pub started_at: String,
    /// When teardown finished (ISO 8601).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<String>,
}

/// The process or an isolated sub-context, with its own registry.
///
/// Nothing is shared between contexts: each one owns its registry
/// exclusively, so ending one never touches another's callbacks. A context
/// that is dropped while still active is ended on drop.
pub struct ExecutionContext {
    id: ContextId,
    kind: ContextKind,
    hook: ContextLifecycleHook,
    started_at: String,
    terminated_at: RwLock<Option<String>>,
}

impl ExecutionContext {
    /// Creates a context reporting through the configured reporter.
    #[must_use]
    pub fn new(kind: ContextKind, config: &TeardownConfig) -> Self {
        Self::with_reporter(kind, config, config.reporter.build())
    }

    /// Creates a context with an explicit reporter.
    #[must_use]
    pub fn with_reporter(
        kind: ContextKind,
        config: &TeardownConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let id = ContextId::new();
        let registry = CallbackRegistry::new()
            .with_context(id)
            .with_reporter(reporter)
            .with_catch_panics(config.catch_panics);

        debug!(context = %id, kind = %kind, "Execution context started");

        Self {
            id,
            kind,
            hook: ContextLifecycleHook::new(Arc::new(registry)),
            started_at: iso_timestamp(),
            terminated_at: RwLock::new(None),
        }
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the context kind.
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Returns true for isolated sub-contexts.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        matches!(self.kind, ContextKind::Isolated { .. })
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.hook.state()
    }

    /// Returns the context's registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        self.hook.registry()
    }

    /// Registers a callback with no captured arguments.
    pub fn register<C: Callback>(&self, callable: Arc<C>) -> Result<Arc<C>, RegistrationError> {
        self.registry().register(callable)
    }

    /// Registers a callback with captured arguments.
    pub fn register_with<C: Callback>(
        &self,
        callable: Arc<C>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Arc<C>, RegistrationError> {
        self.registry().register_with(callable, args, kwargs)
    }

    /// Removes every registration of the given callable.
    pub fn unregister<C: ?Sized>(&self, callable: &Arc<C>) -> usize {
        self.registry().unregister(callable)
    }

    /// Discards pending callbacks without running them.
    pub fn clear(&self) {
        self.registry().clear();
    }

    /// Returns the number of pending callbacks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.registry().count()
    }

    /// Ends the context: drains its registry once and terminates it.
    ///
    /// # Errors
    ///
    /// See [`ContextLifecycleHook::fire`].
    pub fn end(&self) -> Result<DrainSummary, TeardownError> {
        let result = self.hook.fire();
        if !matches!(result, Err(TeardownError::AlreadyTerminated(_))) {
            *self.terminated_at.write() = Some(iso_timestamp());
            info!(context = %self.id, kind = %self.kind, "Execution context ended");
        }
        result
    }

    /// Ends the context on tokio's blocking pool.
    ///
    /// For async hosts: callbacks are synchronous and may block, so they are
    /// kept off the async workers. The drain itself is unchanged, and a
    /// callback panic that was not caught resumes on the awaiting task.
    pub async fn end_on_blocking_thread(self: Arc<Self>) -> Result<DrainSummary, TeardownError> {
        match tokio::task::spawn_blocking(move || self.end()).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(TeardownError::Join(err.to_string())),
        }
    }

    /// Returns a snapshot of the context.
    #[must_use]
    pub fn info(&self) -> ContextInfo {
        ContextInfo {
            id: self.id,
            kind: self.kind,
            state: self.state(),
            pending: self.count(),
            started_at: self.started_at.clone(),
            terminated_at: self.terminated_at.read().clone(),
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if self.hook.state() == LifecycleState::Active {
            // Failures were already reported during the drain.
            let _ = self.end();
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("pending", &self.count())
            .finish()
    }
}
