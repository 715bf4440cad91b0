//! Binding of a registry to its context's teardown event.

use super::LifecycleState;
use crate::context::ContextId;
use crate::errors::TeardownError;
use crate::registry::{CallbackRegistry, DrainSummary};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Fires a registry's drain exactly once, when its context shuts down.
///
/// `Active -> Draining` happens on the first [`fire`](Self::fire);
/// `Draining -> Terminated` once the drain has emptied the registry, which
/// is sealed at that same moment. Any later `fire` is rejected.
pub struct ContextLifecycleHook {
    context: ContextId,
    registry: Arc<CallbackRegistry>,
    state: Mutex<LifecycleState>,
}

impl ContextLifecycleHook {
    /// Creates an active hook for the given registry.
    #[must_use]
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            context: registry.context(),
            registry,
            state: Mutex::new(LifecycleState::Active),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Returns the bound registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Delivers the shutdown event.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::AlreadyTerminated`] if the hook already fired,
    /// or [`TeardownError::CallbackInvocation`] carrying the last callback
    /// failure. In the latter case every callback has still been invoked.
    pub fn fire(&self) -> Result<DrainSummary, TeardownError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Active {
                return Err(TeardownError::AlreadyTerminated(self.context));
            }
            *state = LifecycleState::Draining;
        }

        info!(
            context = %self.context,
            pending = self.registry.count(),
            "Context teardown started"
        );

        let mut unwind = TerminateOnUnwind {
            hook: self,
            armed: true,
        };
        let result = self.registry.drain_and_seal();
        unwind.armed = false;
        *self.state.lock() = LifecycleState::Terminated;

        match result {
            Ok(summary) => {
                info!(
                    context = %self.context,
                    invoked = summary.invoked,
                    "Context terminated"
                );
                Ok(summary)
            }
            Err(error) => {
                warn!(
                    context = %self.context,
                    failed = error.failed,
                    "Context terminated with failing exit callbacks"
                );
                Err(error.into())
            }
        }
    }
}

/// Terminates the hook if an uncaught callback panic unwinds out of the
/// drain, so the context never stays `Draining`.
struct TerminateOnUnwind<'a> {
    hook: &'a ContextLifecycleHook,
    armed: bool,
}

impl Drop for TerminateOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            let discarded = self.hook.registry.abandon();
            *self.hook.state.lock() = LifecycleState::Terminated;
            warn!(
                context = %self.hook.context,
                discarded,
                "Exit callback panicked; context terminated"
            );
        }
    }
}

impl std::fmt::Debug for ContextLifecycleHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLifecycleHook")
            .field("context", &self.context)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::thunk;
    use crate::reporting::NoOpReporter;
    use crate::testing::Recorder;

    fn hook() -> ContextLifecycleHook {
        let registry = CallbackRegistry::new().with_reporter(Arc::new(NoOpReporter));
        ContextLifecycleHook::new(Arc::new(registry))
    }

    #[test]
    fn test_fire_drains_and_terminates() {
        let hook = hook();
        let out = Recorder::new();
        hook.registry().register(out.line("a")).unwrap();
        hook.registry().register(out.line("b")).unwrap();
        assert_eq!(hook.state(), LifecycleState::Active);

        let summary = hook.fire().unwrap();

        assert_eq!(summary.invoked, 2);
        assert_eq!(out.lines(), ["b", "a"]);
        assert_eq!(hook.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_fire_runs_only_once() {
        let hook = hook();
        let out = Recorder::new();
        hook.registry().register(out.line("once")).unwrap();

        hook.fire().unwrap();
        let second = hook.fire();

        assert!(matches!(second, Err(TeardownError::AlreadyTerminated(_))));
        assert_eq!(out.lines(), ["once"]);
    }

    #[test]
    fn test_state_is_draining_while_callbacks_run() {
        let hook = Arc::new(hook());
        let observed = Recorder::new();

        let weak = Arc::downgrade(&hook);
        let sink = observed.clone();
        hook.registry()
            .register(thunk("observer", move || {
                if let Some(hook) = weak.upgrade() {
                    sink.record(hook.state().to_string());
                }
                Ok(())
            }))
            .unwrap();

        hook.fire().unwrap();
        assert_eq!(observed.lines(), ["draining"]);
    }

    #[test]
    fn test_registration_after_termination_fails_fast() {
        let hook = hook();
        hook.fire().unwrap();

        let err = hook.registry().register(thunk("late", || Ok(()))).unwrap_err();
        assert_eq!(err.state, LifecycleState::Terminated);
    }

    #[test]
    fn test_failures_are_surfaced_after_full_drain() {
        let hook = hook();
        let out = Recorder::new();
        hook.registry().register(out.line("survivor")).unwrap();
        hook.registry()
            .register(thunk("broken", || anyhow::bail!("nope")))
            .unwrap();

        let err = hook.fire().unwrap_err();

        assert!(matches!(err, TeardownError::CallbackInvocation(ref e) if e.callback == "broken"));
        assert_eq!(out.lines(), ["survivor"]);
        assert_eq!(hook.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_uncaught_panic_terminates_and_discards_pending() {
        let registry = CallbackRegistry::new()
            .with_reporter(Arc::new(NoOpReporter))
            .with_catch_panics(false);
        let hook = ContextLifecycleHook::new(Arc::new(registry));
        let out = Recorder::new();
        hook.registry().register(out.line("never")).unwrap();
        hook.registry()
            .register(thunk("explodes", || panic!("boom")))
            .unwrap();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.fire()));

        assert!(unwound.is_err());
        assert_eq!(hook.state(), LifecycleState::Terminated);
        assert_eq!(hook.registry().count(), 0);
        assert!(hook.registry().is_sealed());
        assert!(out.lines().is_empty());
        assert!(matches!(hook.fire(), Err(TeardownError::AlreadyTerminated(_))));
    }
}
