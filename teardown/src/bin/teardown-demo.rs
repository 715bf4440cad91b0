//! Teardown demo
//!
//! Runs one end-to-end scenario and exits through the process runtime, so
//! the LIFO ordering contract can be observed from outside the process.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use teardown::callback::{bind, from_fn, thunk, FnCallback, Kwargs, Thunk};
use teardown::config::TeardownConfig;
use teardown::context::Runtime;
use teardown::errors::CallbackResult;
use teardown::observability::{init_logging, LogFormat};
use teardown::process;
use teardown::testing::render_args;

/// Teardown demo - register exit callbacks and shut down
#[derive(Parser, Debug)]
#[command(name = "teardown-demo")]
#[command(about = "Run an exit-callback scenario", long_about = None)]
#[command(version)]
struct Args {
    /// Scenario to run
    #[arg(value_enum)]
    scenario: Scenario,

    /// Exit with the failure status if any callback fails
    #[arg(long)]
    escalate: bool,

    /// Log filter directives
    #[arg(long, env = "TEARDOWN_LOG", default_value = "warn")]
    log: String,

    /// Log output format
    #[arg(long, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Two handlers printing "one" then "two"
    Shutdown,
    /// Two independent runtimes
    Instances,
    /// A method bound to its receiver, receiver slot reassigned afterwards
    Classmethod,
    /// A free function looked up through a type
    Staticmethod,
    /// A failing callback between two printing ones
    Failing,
    /// A callback registering another callback while draining
    Reentrant,
    /// A callback running on isolated context teardown
    Subcontext,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format, &args.log)?;

    let mut config = TeardownConfig::from_env()?;
    if args.escalate {
        config = config.with_escalation(1);
    }
    let runtime = process::init(config)?;
    let guard = process::install();

    match args.scenario {
        Scenario::Shutdown => shutdown()?,
        Scenario::Instances => instances(runtime)?,
        Scenario::Classmethod => classmethod()?,
        Scenario::Staticmethod => staticmethod()?,
        Scenario::Failing => failing()?,
        Scenario::Reentrant => reentrant()?,
        Scenario::Subcontext => subcontext(runtime)?,
    }

    std::process::exit(guard.finish())
}

/// `print` writing to the real stdout.
fn print() -> Arc<FnCallback<impl Fn(&[Value], &Kwargs) -> CallbackResult + Send + Sync>> {
    from_fn("print", |args, _kwargs| {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", render_args(args))?;
        stdout.flush()?;
        Ok(())
    })
}

fn say(text: &'static str) -> Arc<Thunk<impl Fn() -> CallbackResult + Send + Sync>> {
    thunk(text, move || {
        println!("{text}");
        Ok(())
    })
}

fn shutdown() -> Result<()> {
    let f = print();
    process::register_with(f.clone(), vec![json!("one")], Kwargs::new())?;
    process::register_with(f, vec![json!("two")], Kwargs::new())?;
    Ok(())
}

fn instances(runtime: &Runtime) -> Result<()> {
    let first = Runtime::new(runtime.config().clone());
    let second = Runtime::new(runtime.config().clone());

    first
        .process()
        .register_with(print(), vec![json!("atexit1")], Kwargs::new())?;
    second
        .process()
        .register_with(print(), vec![json!("atexit2")], Kwargs::new())?;

    second.shutdown()?;
    first.shutdown()?;
    Ok(())
}

struct Class {
    name: &'static str,
}

impl Class {
    fn f(cls: &Self, _args: &[Value], _kwargs: &Kwargs) -> CallbackResult {
        println!("called classmethod from {}", cls.name);
        Ok(())
    }

    fn g(_args: &[Value], _kwargs: &Kwargs) -> CallbackResult {
        println!("called staticmethod");
        Ok(())
    }
}

fn classmethod() -> Result<()> {
    let slot = Arc::new(Class { name: "A" });
    process::register(bind(slot.clone(), "A.f", Class::f))?;
    // Rebinding the name leaves the registered receiver alone.
    let slot = Arc::new(Class { name: "B" });
    tracing::debug!(receiver = slot.name, "Rebound class slot");
    Ok(())
}

fn staticmethod() -> Result<()> {
    process::register(from_fn("A.g", Class::g))?;
    Ok(())
}

fn failing() -> Result<()> {
    let f = print();
    process::register_with(f.clone(), vec![json!("survivor")], Kwargs::new())?;
    process::register(thunk("fail", || bail!("boom")))?;
    process::register_with(f, vec![json!("last")], Kwargs::new())?;
    Ok(())
}

fn reentrant() -> Result<()> {
    process::register(thunk("outer", || {
        println!("outer");
        process::register(say("inner"))?;
        Ok(())
    }))?;
    Ok(())
}

fn subcontext(runtime: &Runtime) -> Result<()> {
    let before = runtime.total_pending();

    runtime.run_isolated(|ctx| {
        if let Err(err) = ctx.register(say("The test has passed!")) {
            eprintln!("{err}");
        }
    })?;

    let after = runtime.total_pending();
    if before != after || runtime.isolated_count() != 0 {
        bail!("isolated context leaked: {before} pending before, {after} after");
    }
    Ok(())
}
