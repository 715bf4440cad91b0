//! Registered callback entries.

use super::{Callback, Kwargs};
use crate::errors::CallbackResult;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A callable together with the arguments captured when it was registered.
///
/// Entries are immutable; the captured values are released when the entry
/// is dropped.
pub struct CallbackEntry {
    callable: Arc<dyn Callback>,
    args: Vec<Value>,
    kwargs: Kwargs,
    label: String,
}

impl CallbackEntry {
    /// Creates a new entry, capturing the callable's display name.
    #[must_use]
    pub fn new(callable: Arc<dyn Callback>, args: Vec<Value>, kwargs: Kwargs) -> Self {
        let label = callable.name();
        Self {
            callable,
            args,
            kwargs,
            label,
        }
    }

    /// Returns the registered callable.
    #[must_use]
    pub fn callable(&self) -> &Arc<dyn Callback> {
        &self.callable
    }

    /// Returns the captured positional arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Returns the captured keyword arguments.
    #[must_use]
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Returns the display name captured at registration.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True if this entry holds exactly the given allocation.
    #[must_use]
    pub fn holds<C: ?Sized>(&self, callable: &Arc<C>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.callable).cast::<()>(),
            Arc::as_ptr(callable).cast::<()>(),
        )
    }

    /// Downcasts the registered callable to a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Callback>(&self) -> Option<&T> {
        self.callable.as_ref().as_any().downcast_ref::<T>()
    }

    pub(crate) fn invoke(&self) -> CallbackResult {
        self.callable.call(&self.args, &self.kwargs)
    }
}

impl fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("label", &self.label)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{kwargs, thunk};
    use serde_json::json;

    #[test]
    fn test_entry_identity() {
        let a = thunk("a", || Ok(()));
        let b = thunk("b", || Ok(()));
        let entry = CallbackEntry::new(a.clone(), vec![json!(1)], kwargs([("k", json!(2))]));

        assert!(entry.holds(&a));
        assert!(!entry.holds(&b));
        assert_eq!(entry.label(), "a");
        assert_eq!(entry.args(), [json!(1)]);
        assert_eq!(entry.kwargs()["k"], json!(2));
    }

    #[test]
    fn test_entry_releases_captured_callable_on_drop() {
        let a = thunk("a", || Ok(()));
        let entry = CallbackEntry::new(a.clone(), Vec::new(), Kwargs::new());
        assert_eq!(Arc::strong_count(&a), 2);

        drop(entry);
        assert_eq!(Arc::strong_count(&a), 1);
    }
}
