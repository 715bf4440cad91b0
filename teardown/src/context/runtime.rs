//! Host-side map of execution contexts.

use super::{ContextId, ContextInfo, ContextKind, ExecutionContext};
use crate::config::TeardownConfig;
use crate::errors::{CallbackInvocationError, TeardownError};
use crate::lifecycle::LifecycleState;
use crate::registry::DrainSummary;
use crate::reporting::ErrorReporter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Owns the process context and tracks live isolated contexts.
///
/// Contexts are looked up explicitly by id; nothing here is ambient. A
/// context's registry is reachable only through its own handle, which is
/// what keeps teardown of one context from touching another.
pub struct Runtime {
    config: TeardownConfig,
    reporter: Arc<dyn ErrorReporter>,
    process: Arc<ExecutionContext>,
    isolated: RwLock<HashMap<ContextId, Arc<ExecutionContext>>>,
}

impl Runtime {
    /// Creates a runtime with the configured reporter.
    #[must_use]
    pub fn new(config: TeardownConfig) -> Self {
        let reporter = config.reporter.build();
        Self::with_reporter(config, reporter)
    }

    /// Creates a runtime whose contexts all report to `reporter`.
    #[must_use]
    pub fn with_reporter(config: TeardownConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        let process = Arc::new(ExecutionContext::with_reporter(
            ContextKind::Process,
            &config,
            reporter.clone(),
        ));

        Self {
            config,
            reporter,
            process,
            isolated: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TeardownConfig {
        &self.config
    }

    /// Returns the process context.
    #[must_use]
    pub fn process(&self) -> &Arc<ExecutionContext> {
        &self.process
    }

    /// Creates and tracks a new isolated sub-context.
    ///
    /// # Errors
    ///
    /// Fails if the process context is already torn down or the configured
    /// limit of live isolated contexts is reached.
    pub fn spawn_isolated(&self) -> Result<Arc<ExecutionContext>, TeardownError> {
        if !self.process.state().accepts_registrations() {
            return Err(TeardownError::AlreadyTerminated(self.process.id()));
        }

        let mut isolated = self.isolated.write();
        prune_terminated(&mut isolated);
        if let Some(max) = self.config.max_isolated_contexts {
            if isolated.len() >= max {
                return Err(TeardownError::ContextLimit(max));
            }
        }

        let ctx = Arc::new(ExecutionContext::with_reporter(
            ContextKind::Isolated {
                parent: self.process.id(),
            },
            &self.config,
            self.reporter.clone(),
        ));
        isolated.insert(ctx.id(), ctx.clone());
        debug!(context = %ctx.id(), live = isolated.len(), "Spawned isolated context");

        Ok(ctx)
    }

    /// Runs `body` inside a fresh isolated context, then ends it.
    ///
    /// The context is ended and untracked even if `body` panics.
    pub fn run_isolated<F>(&self, body: F) -> Result<DrainSummary, TeardownError>
    where
        F: FnOnce(&Arc<ExecutionContext>),
    {
        let ctx = self.spawn_isolated()?;
        let guard = EndOnDrop {
            runtime: self,
            id: Some(ctx.id()),
        };

        body(&ctx);
        drop(ctx);

        guard.finish()
    }

    /// Ends and untracks an isolated context.
    pub fn end_context(&self, id: ContextId) -> Result<DrainSummary, TeardownError> {
        let ctx = self
            .isolated
            .write()
            .remove(&id)
            .ok_or(TeardownError::UnknownContext(id))?;
        ctx.end()
    }

    /// Looks up a context, including the process context.
    #[must_use]
    pub fn context(&self, id: ContextId) -> Option<Arc<ExecutionContext>> {
        if id == self.process.id() {
            return Some(self.process.clone());
        }
        self.isolated
            .read()
            .get(&id)
            .filter(|ctx| ctx.state() != LifecycleState::Terminated)
            .cloned()
    }

    /// Returns snapshots of the process context and all live isolated ones.
    #[must_use]
    pub fn live_contexts(&self) -> Vec<ContextInfo> {
        let mut infos = vec![self.process.info()];
        infos.extend(self.tracked().iter().map(|ctx| ctx.info()));
        infos
    }

    /// Returns the number of live isolated contexts.
    #[must_use]
    pub fn isolated_count(&self) -> usize {
        self.tracked().len()
    }

    /// Total pending callbacks across every live context.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.process.count() + self.tracked().iter().map(|ctx| ctx.count()).sum::<usize>()
    }

    /// Untracks contexts that were ended through their own handle and
    /// returns the ones still live.
    fn tracked(&self) -> Vec<Arc<ExecutionContext>> {
        let mut isolated = self.isolated.write();
        prune_terminated(&mut isolated);
        isolated.values().cloned().collect()
    }

    /// Ends every isolated context, then the process context, then any
    /// isolated context spawned while the process context was draining.
    ///
    /// All contexts are drained even if some fail; the returned error is
    /// the last failure, with the failure count summed over all contexts.
    pub fn shutdown(&self) -> Result<DrainSummary, TeardownError> {
        if !self.process.state().accepts_registrations() {
            return Err(TeardownError::AlreadyTerminated(self.process.id()));
        }

        let mut outcome = ShutdownOutcome::default();
        self.end_all_isolated(&mut outcome)?;
        outcome.absorb(self.process.end())?;
        // The process context is terminated now, so no new ones can appear.
        self.end_all_isolated(&mut outcome)?;

        outcome.finish()
    }

    fn end_all_isolated(&self, outcome: &mut ShutdownOutcome) -> Result<(), TeardownError> {
        loop {
            let children: Vec<Arc<ExecutionContext>> =
                self.isolated.write().drain().map(|(_, ctx)| ctx).collect();
            if children.is_empty() {
                return Ok(());
            }
            for ctx in children {
                outcome.absorb(ctx.end())?;
            }
        }
    }

    /// Maps a shutdown outcome to a process exit status.
    #[must_use]
    pub fn exit_code(&self, outcome: &Result<DrainSummary, TeardownError>) -> i32 {
        match outcome {
            Err(TeardownError::CallbackInvocation(_)) if self.config.escalate_failures => {
                self.config.failure_exit_code
            }
            _ => 0,
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(TeardownConfig::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("process", &self.process.id())
            .field("isolated", &self.isolated_count())
            .finish()
    }
}

fn prune_terminated(isolated: &mut HashMap<ContextId, Arc<ExecutionContext>>) {
    isolated.retain(|_, ctx| ctx.state() != LifecycleState::Terminated);
}

#[derive(Default)]
struct ShutdownOutcome {
    total: DrainSummary,
    last_error: Option<CallbackInvocationError>,
}

impl ShutdownOutcome {
    fn absorb(&mut self, result: Result<DrainSummary, TeardownError>) -> Result<(), TeardownError> {
        match result {
            Ok(summary) => self.total.invoked += summary.invoked,
            Err(TeardownError::CallbackInvocation(error)) => {
                self.total.failed += error.failed;
                self.last_error = Some(error);
            }
            // Ended concurrently by someone else; nothing left to drain.
            Err(TeardownError::AlreadyTerminated(_)) => {}
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn finish(self) -> Result<DrainSummary, TeardownError> {
        match self.last_error {
            Some(error) => Err(error.with_failed(self.total.failed).into()),
            None => Ok(self.total),
        }
    }
}

/// Ends an isolated context when dropped, unless already finished.
struct EndOnDrop<'a> {
    runtime: &'a Runtime,
    id: Option<ContextId>,
}

impl EndOnDrop<'_> {
    fn finish(mut self) -> Result<DrainSummary, TeardownError> {
        match self.id.take() {
            Some(id) => self.runtime.end_context(id),
            None => Ok(DrainSummary::default()),
        }
    }
}

impl Drop for EndOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = self.runtime.end_context(id);
        }
    }
}
