//! Execution contexts and the runtime that tracks them.
//!
//! This module provides:
//! - Context identity and kind (process or isolated)
//! - `ExecutionContext`, which owns one registry and its lifecycle hook
//! - `Runtime`, the explicit context-to-registry map used by hosts

mod execution;
mod identity;
mod runtime;

pub use execution::{ContextInfo, ExecutionContext};
pub use identity::{ContextId, ContextKind};
pub use runtime::Runtime;
