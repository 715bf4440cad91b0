//! An in-memory stand-in for standard output.

use crate::callback::{from_fn, thunk, FnCallback, Kwargs, Thunk};
use crate::errors::CallbackResult;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Collects lines written by callbacks, in invocation order.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn record(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Returns a copy of the recorded lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// A callback named `text` that records `text` when invoked.
    #[must_use]
    pub fn line(&self, text: &str) -> Arc<Thunk<impl Fn() -> CallbackResult + Send + Sync + 'static>> {
        let text = text.to_string();
        let lines = self.lines.clone();
        thunk(text.clone(), move || {
            lines.lock().push(text.clone());
            Ok(())
        })
    }

    /// A `print`-like callback recording its positional arguments joined by
    /// spaces. Strings are recorded without quotes.
    #[must_use]
    pub fn printer(
        &self,
    ) -> Arc<FnCallback<impl Fn(&[Value], &Kwargs) -> CallbackResult + Send + Sync + 'static>> {
        let lines = self.lines.clone();
        from_fn("print", move |args, _kwargs| {
            lines.lock().push(render_args(args));
            Ok(())
        })
    }
}

/// Renders arguments the way `print` would: space separated, strings bare.
#[must_use]
pub fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
