//! Context lifecycle: `Active -> Draining -> Terminated`.

mod hook;
mod state;

pub use hook::ContextLifecycleHook;
pub use state::LifecycleState;
