//! Callback registries.
//!
//! A [`CallbackRegistry`] belongs to exactly one execution context. It keeps
//! its entries in registration order and drains them in reverse.

mod callbacks;
#[cfg(test)]
mod registry_tests;
mod summary;

pub use callbacks::CallbackRegistry;
pub use summary::DrainSummary;
