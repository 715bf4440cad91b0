//! Drain accounting.

use serde::{Deserialize, Serialize};

/// Counts gathered by one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrainSummary {
    /// Callbacks invoked, including re-entrant registrations.
    pub invoked: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

impl DrainSummary {
    /// True if every invoked callback succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
