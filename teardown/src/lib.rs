//! # Teardown
//!
//! An exit-handler registry: register callbacks with captured arguments and
//! have them invoked, last registered first, when their execution context
//! is torn down.
//!
//! Teardown provides:
//!
//! - **LIFO drains**: callbacks run in reverse registration order, and
//!   callbacks registered while draining run in the same drain
//! - **Isolated contexts**: the process and any number of isolated
//!   sub-contexts, each with its own registry and lifecycle
//! - **Failure containment**: a failing or panicking callback is reported
//!   and the drain continues; the last failure is surfaced to the host
//! - **Leak-free teardown**: captured values are released once their entry
//!   is drained, cleared or dropped
//!
//! ## Quick Start
//!
//! ```rust
//! use teardown::prelude::*;
//!
//! let runtime = Runtime::default();
//! let out = Recorder::new();
//!
//! runtime.process().register(out.line("one")).unwrap();
//! runtime.process().register(out.line("two")).unwrap();
//!
//! runtime.shutdown().unwrap();
//! assert_eq!(out.lines(), ["two", "one"]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod callback;
pub mod config;
pub mod context;
pub mod errors;
pub mod lifecycle;
pub mod observability;
pub mod process;
pub mod registry;
pub mod reporting;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::callback::{bind, from_fn, kwargs, thunk, Callback, Kwargs};
    pub use crate::config::TeardownConfig;
    pub use crate::context::{ContextId, ContextKind, ExecutionContext, Runtime};
    pub use crate::errors::{
        CallbackInvocationError, CallbackResult, RegistrationError, TeardownError,
    };
    pub use crate::lifecycle::{ContextLifecycleHook, LifecycleState};
    pub use crate::registry::{CallbackRegistry, DrainSummary};
    pub use crate::reporting::{ErrorReporter, ReporterKind};
    pub use crate::testing::Recorder;
}
