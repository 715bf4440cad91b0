//! Testing utilities for code that registers exit callbacks.
//!
//! This module provides:
//! - A `Recorder` that stands in for standard output
//! - Assertions for LIFO order and leak-freedom

mod assertions;
mod recorder;

pub use assertions::{assert_drained_in_reverse, assert_no_leak, assert_nothing_ran};
pub use recorder::{render_args, Recorder};
