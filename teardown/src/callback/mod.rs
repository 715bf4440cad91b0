//! Callables and the entries that capture them.
//!
//! Any value implementing [`Callback`] can be registered. Closures are
//! wrapped with [`from_fn`] or [`thunk`]; methods are bound to their receiver
//! up front with [`bind`].

mod callable;
mod entry;

pub use callable::{
    bind, from_fn, kwargs, thunk, AsAny, BoundMethod, Callback, FnCallback, Kwargs, Method, Thunk,
};
pub use entry::CallbackEntry;
