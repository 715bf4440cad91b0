//! The callable capability and its adapters.

use crate::errors::CallbackResult;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Keyword arguments captured with a callback, in insertion order.
pub type Kwargs = serde_json::Map<String, Value>;

/// Upcast helper so registered callables can be inspected by concrete type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Anything that can be invoked at teardown with captured arguments.
///
/// Implementors receive the positional and keyword arguments that were
/// captured when they were registered. Returning an error (or panicking)
/// marks the invocation as failed; the drain still continues.
pub trait Callback: AsAny + Send + Sync {
    /// Invokes the callback.
    fn call(&self, args: &[Value], kwargs: &Kwargs) -> CallbackResult;

    /// Display name used when reporting failures.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// A named closure taking the captured arguments.
pub struct FnCallback<F> {
    name: String,
    func: F,
}

impl<F> Callback for FnCallback<F>
where
    F: Fn(&[Value], &Kwargs) -> CallbackResult + Send + Sync + 'static,
{
    fn call(&self, args: &[Value], kwargs: &Kwargs) -> CallbackResult {
        (self.func)(args, kwargs)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnCallback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallback").field("name", &self.name).finish()
    }
}

/// Wraps a closure that consumes captured arguments.
///
/// ```
/// use teardown::callback::from_fn;
///
/// let greet = from_fn("greet", |args, _kwargs| {
///     println!("{}", args[0]);
///     Ok(())
/// });
/// ```
pub fn from_fn<F>(name: impl Into<String>, func: F) -> Arc<FnCallback<F>>
where
    F: Fn(&[Value], &Kwargs) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(FnCallback {
        name: name.into(),
        func,
    })
}

/// A named closure that ignores captured arguments.
pub struct Thunk<F> {
    name: String,
    func: F,
}

impl<F> Callback for Thunk<F>
where
    F: Fn() -> CallbackResult + Send + Sync + 'static,
{
    fn call(&self, _args: &[Value], _kwargs: &Kwargs) -> CallbackResult {
        (self.func)()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for Thunk<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk").field("name", &self.name).finish()
    }
}

/// Wraps a zero-argument closure.
pub fn thunk<F>(name: impl Into<String>, func: F) -> Arc<Thunk<F>>
where
    F: Fn() -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(Thunk {
        name: name.into(),
        func,
    })
}

/// Method signature accepted by [`bind`].
pub type Method<T> = fn(&T, &[Value], &Kwargs) -> CallbackResult;

/// A method bound to its receiver at creation time.
///
/// The receiver is held by the callback itself, so whatever slot the method
/// was looked up from can be reassigned or emptied afterwards without
/// changing what runs at teardown.
pub struct BoundMethod<T: ?Sized> {
    receiver: Arc<T>,
    method: Method<T>,
    name: String,
}

impl<T: ?Sized> BoundMethod<T> {
    /// Returns the bound receiver.
    #[must_use]
    pub fn receiver(&self) -> &Arc<T> {
        &self.receiver
    }
}

impl<T> Callback for BoundMethod<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn call(&self, args: &[Value], kwargs: &Kwargs) -> CallbackResult {
        (self.method)(&self.receiver, args, kwargs)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<T: ?Sized> fmt::Debug for BoundMethod<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod").field("name", &self.name).finish()
    }
}

/// Binds `method` to `receiver`, resolving the binding now.
pub fn bind<T>(receiver: Arc<T>, name: impl Into<String>, method: Method<T>) -> Arc<BoundMethod<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(BoundMethod {
        receiver,
        method,
        name: name.into(),
    })
}

/// Builds a keyword-argument map from `(name, value)` pairs.
pub fn kwargs<I, K>(pairs: I) -> Kwargs
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
