//! Process-level convenience API.
//!
//! A thin facade over one lazily created [`Runtime`] whose process context
//! stands for the whole program. The host still has to deliver the
//! shutdown event, either by holding an [`ExitGuard`] from [`install`] or
//! by leaving through [`exit`].
//!
//! ```no_run
//! use teardown::callback::thunk;
//!
//! fn main() {
//!     let _guard = teardown::process::install();
//!     teardown::process::register(thunk("bye", || {
//!         println!("bye");
//!         Ok(())
//!     }))
//!     .unwrap();
//! }
//! ```

use crate::callback::{Callback, Kwargs};
use crate::config::TeardownConfig;
use crate::context::Runtime;
use crate::errors::{CallbackInvocationError, RegistrationError, TeardownError};
use crate::registry::DrainSummary;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::warn;

static PROCESS_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initializes the process runtime with an explicit configuration.
///
/// # Errors
///
/// Fails if the process runtime was already created, explicitly or by a
/// first call to any other function in this module.
pub fn init(config: TeardownConfig) -> Result<&'static Runtime, TeardownError> {
    config.validate()?;
    let mut created = false;
    let runtime = PROCESS_RUNTIME.get_or_init(|| {
        created = true;
        Runtime::new(config)
    });
    if created {
        Ok(runtime)
    } else {
        Err(TeardownError::Config(
            "process runtime already initialized".to_string(),
        ))
    }
}

/// Returns the process runtime, creating it from `TEARDOWN_*` variables on
/// first use. Invalid variables fall back to the defaults.
pub fn runtime() -> &'static Runtime {
    PROCESS_RUNTIME.get_or_init(|| {
        let config = TeardownConfig::from_env().unwrap_or_else(|err| {
            warn!(error = %err, "Ignoring invalid teardown environment configuration");
            TeardownConfig::default()
        });
        Runtime::new(config)
    })
}

/// Registers a callback on the process context. Returns it unchanged.
pub fn register<C: Callback>(callable: Arc<C>) -> Result<Arc<C>, RegistrationError> {
    runtime().process().register(callable)
}

/// Registers a callback with captured arguments on the process context.
pub fn register_with<C: Callback>(
    callable: Arc<C>,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Arc<C>, RegistrationError> {
    runtime().process().register_with(callable, args, kwargs)
}

/// Removes every process-level registration of `callable`.
pub fn unregister<C: ?Sized>(callable: &Arc<C>) -> usize {
    runtime().process().unregister(callable)
}

/// Discards all process-level callbacks without running them.
pub fn clear() {
    runtime().process().clear();
}

/// Number of pending process-level callbacks.
pub fn ncallbacks() -> usize {
    runtime().process().count()
}

/// Runs and removes the pending process-level callbacks now, without
/// terminating the process context.
pub fn run_exitfuncs() -> Result<DrainSummary, CallbackInvocationError> {
    runtime().process().registry().drain()
}

/// Delivers the normal-termination event: ends every isolated context and
/// then the process context.
pub fn shutdown() -> Result<DrainSummary, TeardownError> {
    runtime().shutdown()
}

/// Shuts down and terminates the process.
///
/// A zero `code` is replaced by the configured failure status when
/// escalation is enabled and a callback failed.
pub fn exit(code: i32) -> ! {
    let outcome = shutdown();
    let code = if code == 0 {
        runtime().exit_code(&outcome)
    } else {
        code
    };
    std::process::exit(code)
}

/// Shuts the process context down when dropped.
#[derive(Debug)]
#[must_use = "the process context is shut down when the guard is dropped"]
pub struct ExitGuard {
    armed: bool,
}

/// Returns a guard that delivers the shutdown event when it goes out of
/// scope, typically at the end of `main`.
pub fn install() -> ExitGuard {
    let _ = runtime();
    ExitGuard { armed: true }
}

impl ExitGuard {
    /// Shuts down now and returns the exit status the host should use.
    pub fn finish(mut self) -> i32 {
        self.armed = false;
        let outcome = shutdown();
        runtime().exit_code(&outcome)
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.armed {
            // Failures were reported during the drain; an already terminated
            // context means someone shut down explicitly.
            let _ = shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::thunk;
    use crate::testing::Recorder;

    // The process runtime is shared by every test in this binary, so only
    // one test touches it and it never shuts it down.
    #[test]
    fn test_process_facade_register_unregister_clear_run() {
        let out = Recorder::new();
        clear();
        let baseline = ncallbacks();

        let a = register(out.line("a")).unwrap();
        register(out.line("b")).unwrap();
        let c = register(out.line("c")).unwrap();
        assert_eq!(ncallbacks(), baseline + 3);

        assert_eq!(unregister(&c), 1);
        assert_eq!(unregister(&c), 0);

        let summary = run_exitfuncs().unwrap();
        assert_eq!(summary.invoked, 2);
        assert_eq!(out.lines(), ["b", "a"]);

        register(a).unwrap();
        clear();
        assert_eq!(run_exitfuncs().unwrap().invoked, 0);
        assert_eq!(ncallbacks(), 0);

        assert!(init(TeardownConfig::default()).is_err());

        register_with(
            thunk("args", || Ok(())),
            vec![serde_json::json!(1)],
            Kwargs::new(),
        )
        .unwrap();
        assert_eq!(ncallbacks(), 1);
        clear();
    }
}
