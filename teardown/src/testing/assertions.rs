//! Test assertions for drain order and leak checks.

use super::Recorder;
use crate::context::Runtime;

/// Asserts that callbacks recorded as `registered` ran in exact reverse
/// order.
pub fn assert_drained_in_reverse(recorder: &Recorder, registered: &[&str]) {
    let expected: Vec<&str> = registered.iter().rev().copied().collect();
    let actual = recorder.lines();
    assert_eq!(
        actual, expected,
        "Expected LIFO order {:?}, got {:?}",
        expected, actual
    );
}

/// Asserts that nothing was invoked.
pub fn assert_nothing_ran(recorder: &Recorder) {
    let actual = recorder.lines();
    assert!(
        actual.is_empty(),
        "Expected no callbacks to run, but got {:?}",
        actual
    );
}

/// Asserts that a runtime's pending count is back at `baseline`.
pub fn assert_no_leak(runtime: &Runtime, baseline: usize) {
    let pending = runtime.total_pending();
    assert_eq!(
        pending, baseline,
        "Expected {} pending callbacks after teardown, found {}",
        baseline, pending
    );
    assert_eq!(
        runtime.isolated_count(),
        0,
        "Expected every isolated context to be untracked"
    );
}
