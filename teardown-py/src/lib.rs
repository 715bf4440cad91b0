//! Python bindings for the teardown exit-handler registry.
//!
//! Exposes an `atexit`-compatible surface backed by the Rust process
//! runtime, plus explicit isolated contexts.

use anyhow::anyhow;
use pyo3::exceptions::{PyRuntimeError, PyTypeError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use serde_json::Value;
use std::sync::Arc;
use teardown::callback::{AsAny, Callback, Kwargs};
use teardown::context::ExecutionContext;
use teardown::errors::{CallbackResult, TeardownError};
use teardown::process;

/// A Python callable with the arguments captured at registration.
struct PyCallback {
    func: Py<PyAny>,
    args: Py<PyTuple>,
    kwargs: Option<Py<PyDict>>,
}

impl Callback for PyCallback {
    fn call(&self, _args: &[Value], _kwargs: &Kwargs) -> CallbackResult {
        Python::with_gil(|py| {
            self.func
                .bind(py)
                .call(
                    self.args.bind(py).clone(),
                    self.kwargs.as_ref().map(|k| k.bind(py)),
                )
                .map(drop)
                .map_err(|err| anyhow!(describe(py, &err)))
        })
    }

    fn name(&self) -> String {
        Python::with_gil(|py| {
            let func = self.func.bind(py);
            func.getattr("__qualname__")
                .and_then(|name| name.extract::<String>())
                .or_else(|_| func.repr().map(|repr| repr.to_string()))
                .unwrap_or_else(|_| "<callable>".to_string())
        })
    }
}

/// Formats an exception with its traceback, as Python would print it.
fn describe(py: Python<'_>, err: &PyErr) -> String {
    let traceback = err
        .traceback_bound(py)
        .and_then(|tb| tb.format().ok())
        .unwrap_or_default();
    format!("{traceback}{err}")
}

fn to_py_err(err: TeardownError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

fn register_into<'py>(
    ctx: &ExecutionContext,
    func: Bound<'py, PyAny>,
    args: &Bound<'py, PyTuple>,
    kwargs: Option<&Bound<'py, PyDict>>,
) -> PyResult<Bound<'py, PyAny>> {
    if !func.is_callable() {
        return Err(PyTypeError::new_err("the first argument must be callable"));
    }

    let callback = Arc::new(PyCallback {
        func: func.clone().unbind(),
        args: args.clone().unbind(),
        kwargs: kwargs.map(|k| k.clone().unbind()),
    });
    ctx.register(callback)
        .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;

    Ok(func)
}

/// Removes every registration whose callable compares equal to `func`.
///
/// Equality is evaluated outside the registry lock since `__eq__` may run
/// arbitrary Python code.
fn unregister_from(ctx: &ExecutionContext, func: &Bound<'_, PyAny>) -> PyResult<()> {
    let registry = ctx.registry();
    let mut matched = Vec::new();
    for callable in registry.callables() {
        if let Some(cb) = callable.as_ref().as_any().downcast_ref::<PyCallback>() {
            if cb.func.bind(func.py()).eq(func)? {
                matched.push(callable.clone());
            }
        }
    }
    for callable in &matched {
        registry.unregister(callable);
    }
    Ok(())
}

/// Register a function to be executed upon normal program termination.
///
/// Returns `func` so this can be used as a decorator.
#[pyfunction]
#[pyo3(signature = (func, *args, **kwargs))]
fn register<'py>(
    func: Bound<'py, PyAny>,
    args: &Bound<'py, PyTuple>,
    kwargs: Option<&Bound<'py, PyDict>>,
) -> PyResult<Bound<'py, PyAny>> {
    register_into(process::runtime().process(), func, args, kwargs)
}

/// Unregister an exit function which was previously registered.
#[pyfunction]
fn unregister(func: &Bound<'_, PyAny>) -> PyResult<()> {
    unregister_from(process::runtime().process(), func)
}

/// Clear the list of previously registered exit functions.
#[pyfunction]
fn _clear() {
    process::clear();
}

/// Return the number of registered exit functions.
#[pyfunction]
fn _ncallbacks() -> usize {
    process::ncallbacks()
}

/// Run all registered exit functions.
///
/// Failures are reported to stderr and not raised.
#[pyfunction]
fn _run_exitfuncs() {
    let _ = process::run_exitfuncs();
}

/// Interpreter-exit hook; ends every context of the process runtime.
#[pyfunction]
fn _shutdown() {
    let _ = process::shutdown();
}

/// An isolated context with its own exit functions, run when it ends.
#[pyclass(name = "ExitContext")]
struct PyExitContext {
    ctx: Arc<ExecutionContext>,
}

#[pymethods]
impl PyExitContext {
    #[getter]
    fn id(&self) -> String {
        self.ctx.id().to_string()
    }

    #[getter]
    fn state(&self) -> String {
        self.ctx.state().to_string()
    }

    #[pyo3(signature = (func, *args, **kwargs))]
    fn register<'py>(
        &self,
        func: Bound<'py, PyAny>,
        args: &Bound<'py, PyTuple>,
        kwargs: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        register_into(&self.ctx, func, args, kwargs)
    }

    fn unregister(&self, func: &Bound<'_, PyAny>) -> PyResult<()> {
        unregister_from(&self.ctx, func)
    }

    fn _clear(&self) {
        self.ctx.clear();
    }

    fn _ncallbacks(&self) -> usize {
        self.ctx.count()
    }

    /// Runs the context's exit functions and terminates it.
    fn end(&self) -> PyResult<()> {
        match process::runtime().end_context(self.ctx.id()) {
            // Already reported during the drain.
            Ok(_) | Err(TeardownError::CallbackInvocation(_)) => Ok(()),
            Err(err) => Err(to_py_err(err)),
        }
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (*_exc))]
    fn __exit__(&self, _exc: &Bound<'_, PyTuple>) -> PyResult<bool> {
        self.end()?;
        Ok(false)
    }

    fn __repr__(&self) -> String {
        format!(
            "ExitContext(id={}, state={}, pending={})",
            self.ctx.id(),
            self.ctx.state(),
            self.ctx.count()
        )
    }
}

/// Creates a new isolated context.
#[pyfunction]
fn isolated() -> PyResult<PyExitContext> {
    let ctx = process::runtime().spawn_isolated().map_err(to_py_err)?;
    Ok(PyExitContext { ctx })
}

/// The teardown Python module.
#[pymodule]
fn teardown_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(register, m)?)?;
    m.add_function(wrap_pyfunction!(unregister, m)?)?;
    m.add_function(wrap_pyfunction!(_clear, m)?)?;
    m.add_function(wrap_pyfunction!(_ncallbacks, m)?)?;
    m.add_function(wrap_pyfunction!(_run_exitfuncs, m)?)?;
    m.add_function(wrap_pyfunction!(isolated, m)?)?;
    m.add_class::<PyExitContext>()?;

    // Python delivers the normal-termination event.
    let atexit = m.py().import_bound("atexit")?;
    atexit.call_method1("register", (wrap_pyfunction!(_shutdown, m)?,))?;

    // Add version info
    m.add("__version__", "0.1.0")?;
    m.add("__rust_version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
