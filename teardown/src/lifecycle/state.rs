//! Lifecycle states of an execution context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an execution context is in its teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Running normally; registrations are accepted.
    #[default]
    Active,
    /// Teardown in progress; callbacks may still register more callbacks.
    Draining,
    /// Teardown finished; registrations fail.
    Terminated,
}

impl LifecycleState {
    /// Returns true if registrations are accepted in this state.
    #[must_use]
    pub const fn accepts_registrations(self) -> bool {
        !matches!(self, Self::Terminated)
    }

    /// Returns true once teardown has begun.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::Draining | Self::Terminated)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}
