//! The per-context callback registry.

use super::DrainSummary;
use crate::callback::{Callback, CallbackEntry, Kwargs};
use crate::context::ContextId;
use crate::errors::{CallbackInvocationError, RegistrationError};
use crate::lifecycle::LifecycleState;
use crate::reporting::{ErrorReporter, StderrReporter};
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, debug_span};

#[derive(Default)]
struct Inner {
    entries: Vec<CallbackEntry>,
    sealed: bool,
}

/// Ordered container of callbacks, drained in LIFO order.
///
/// The lock is only held to push, pop or remove entries. Callbacks run
/// (and removed entries are dropped) with the lock released, so a callback
/// may freely register, unregister or count against the same registry.
pub struct CallbackRegistry {
    context: ContextId,
    inner: Mutex<Inner>,
    reporter: Arc<dyn ErrorReporter>,
    catch_panics: bool,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Creates a standalone registry reporting to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: ContextId::new(),
            inner: Mutex::new(Inner::default()),
            reporter: Arc::new(StderrReporter),
            catch_panics: true,
        }
    }

    /// Sets the owning context id.
    #[must_use]
    pub fn with_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    /// Sets the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets whether panicking callbacks are caught and reported.
    ///
    /// When disabled, a panic unwinds out of the drain. A lifecycle hook
    /// firing the drain then terminates the context and discards the
    /// entries not yet invoked.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Returns the owning context id.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Registers a callback with no captured arguments.
    ///
    /// Returns the callable unchanged.
    pub fn register<C: Callback>(&self, callable: Arc<C>) -> Result<Arc<C>, RegistrationError> {
        self.register_with(callable, Vec::new(), Kwargs::new())
    }

    /// Registers a callback with captured positional and keyword arguments.
    ///
    /// Returns the callable unchanged, so registration can sit in
    /// expression position.
    pub fn register_with<C: Callback>(
        &self,
        callable: Arc<C>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Arc<C>, RegistrationError> {
        let entry = CallbackEntry::new(callable.clone(), args, kwargs);

        let mut inner = self.inner.lock();
        if inner.sealed {
            drop(inner);
            return Err(RegistrationError::new(
                self.context,
                entry.label(),
                LifecycleState::Terminated,
            ));
        }
        debug!(context = %self.context, callback = %entry.label(), "Registered exit callback");
        inner.entries.push(entry);

        Ok(callable)
    }

    /// Removes every entry holding this exact callable.
    ///
    /// Returns the number of removed entries; zero is not an error.
    pub fn unregister<C: ?Sized>(&self, callable: &Arc<C>) -> usize {
        self.unregister_where(|entry| entry.holds(callable))
    }

    /// Removes every entry matching `predicate`.
    ///
    /// The predicate runs under the registry lock and must not call back
    /// into this registry.
    pub fn unregister_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&CallbackEntry) -> bool,
    {
        let removed: Vec<CallbackEntry> = {
            let mut inner = self.inner.lock();
            let (removed, kept) = std::mem::take(&mut inner.entries)
                .into_iter()
                .partition(|entry| predicate(entry));
            inner.entries = kept;
            removed
        };

        if !removed.is_empty() {
            debug!(context = %self.context, removed = removed.len(), "Unregistered exit callbacks");
        }
        removed.len()
    }

    /// Returns the pending callables in registration order.
    ///
    /// Lets callers match entries with logic that must not run under the
    /// registry lock, then remove them with [`Self::unregister`].
    #[must_use]
    pub fn callables(&self) -> Vec<Arc<dyn Callback>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|entry| entry.callable().clone())
            .collect()
    }

    /// Returns the number of pending callbacks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Returns the labels of pending callbacks in registration order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|entry| entry.label().to_string())
            .collect()
    }

    /// Returns true once the registry stopped accepting registrations.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// Discards all pending callbacks without invoking them.
    pub fn clear(&self) {
        let discarded = std::mem::take(&mut self.inner.lock().entries);
        if !discarded.is_empty() {
            debug!(context = %self.context, discarded = discarded.len(), "Cleared exit callbacks");
        }
    }

    /// Seals the registry and discards whatever is still pending.
    pub(crate) fn abandon(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.sealed = true;
            std::mem::take(&mut inner.entries)
        };
        discarded.len()
    }

    /// Invokes and removes every pending callback, last registered first.
    ///
    /// Callbacks registered while draining are appended and run before this
    /// returns. Each failure is handed to the reporter and the drain goes on;
    /// if any callback failed, the last failure is returned with the total
    /// failure count.
    pub fn drain(&self) -> Result<DrainSummary, CallbackInvocationError> {
        self.drain_inner(false)
    }

    /// Drains, then seals the registry in the same critical section that
    /// observed it empty.
    pub(crate) fn drain_and_seal(&self) -> Result<DrainSummary, CallbackInvocationError> {
        self.drain_inner(true)
    }

    fn drain_inner(&self, seal: bool) -> Result<DrainSummary, CallbackInvocationError> {
        let span = debug_span!("teardown.drain", context = %self.context);
        let _enter = span.enter();

        let mut summary = DrainSummary::default();
        let mut last_error = None;

        loop {
            let entry = {
                let mut inner = self.inner.lock();
                match inner.entries.pop() {
                    Some(entry) => entry,
                    None => {
                        inner.sealed |= seal;
                        break;
                    }
                }
            };

            summary.invoked += 1;
            if let Err(error) = self.invoke(&entry) {
                summary.failed += 1;
                self.reporter.report(self.context, &error);
                last_error = Some(error);
            }
        }

        debug!(
            invoked = summary.invoked,
            failed = summary.failed,
            "Drain complete"
        );

        match last_error {
            Some(error) => Err(error.with_failed(summary.failed)),
            None => Ok(summary),
        }
    }

    fn invoke(&self, entry: &CallbackEntry) -> Result<(), CallbackInvocationError> {
        if !self.catch_panics {
            return entry
                .invoke()
                .map_err(|err| CallbackInvocationError::from_error(entry.label(), &err));
        }

        match catch_unwind(AssertUnwindSafe(|| entry.invoke())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackInvocationError::from_error(entry.label(), &err)),
            Err(payload) => Err(CallbackInvocationError::from_panic(
                entry.label(),
                payload.as_ref(),
            )),
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("context", &self.context)
            .field("pending_count", &self.count())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
