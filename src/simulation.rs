//! Wiring between configuration, the Lua engine and the session.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use lockstep_config::Config;
use lockstep_engine::{EngineError, LuaEngine, ScriptEngine};
use lockstep_session::{
    BreakpointPlan, Coordinator, SequentialReport, SessionOptions, SimulationReport,
    SEQUENTIAL_ITERATIONS,
};

/// Program loaded by the sequential simulation.
pub const BUILTIN_PROGRAM: &str = include_str!("../demos/user_request.lua");

/// Name the built-in program is loaded under.
pub const BUILTIN_PROGRAM_NAME: &str = "user_request.lua";

/// Translate configuration into session options.
pub fn session_options(config: &Config) -> SessionOptions {
    let session = &config.session;
    SessionOptions {
        client: session.client.clone(),
        handler_function: session.handler_function.clone(),
        command_timeout: Duration::from_millis(session.command_timeout_ms),
        readiness_timeout: Duration::from_millis(session.readiness_timeout_ms),
        request_interval: Duration::from_millis(session.request_interval_ms),
        max_requests: (session.max_requests > 0).then_some(session.max_requests),
        command_buffer_units: session.command_buffer_units,
        breakpoint: BreakpointPlan {
            target: config.breakpoint.target.clone(),
            line: config.breakpoint.line,
            column: config.breakpoint.column,
        },
    }
}

/// Render `log(...)` arguments the way the program's output is printed.
pub fn format_log_line(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expose `log(...)` to the program; it prints its arguments to stdout.
pub fn register_log<E: ScriptEngine>(engine: &E) -> Result<(), EngineError> {
    engine.register_native(
        "log",
        Arc::new(|args: &[Value]| println!("{}", format_log_line(args))),
    )
}

fn new_engine() -> Result<LuaEngine> {
    let engine = LuaEngine::new();
    register_log(&engine).context("failed to register host functions")?;
    Ok(engine)
}

/// Load `program` and run the request driver alongside the control
/// sequence.
pub async fn run_concurrent(config: &Config, program: &Path) -> Result<SimulationReport> {
    let source = std::fs::read_to_string(program)
        .with_context(|| format!("failed to read program: {}", program.display()))?;
    let name = program
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("program");

    let mut coordinator = Coordinator::new(session_options(config));
    coordinator.bootstrap(new_engine()?, name, &source)?;
    let report = coordinator.run().await?;
    Ok(report)
}

/// Run the single-threaded simulation against the built-in program.
pub fn run_sequential(config: &Config) -> Result<SequentialReport> {
    let mut coordinator = Coordinator::new(session_options(config));
    coordinator.bootstrap(new_engine()?, BUILTIN_PROGRAM_NAME, BUILTIN_PROGRAM)?;
    let report = coordinator.run_sequential(SEQUENTIAL_ITERATIONS)?;
    Ok(report)
}

/// Print a one-line-per-item summary of a concurrent run.
pub fn print_concurrent_report(report: &SimulationReport) {
    println!(
        "requests: {} ({} failed)",
        report.driver.requests, report.driver.failures
    );
    for op in &report.operations {
        let status = if op.succeeded { "ok" } else { "failed" };
        println!("{}: {} ({})", op.command, status, op.detail);
    }
    if let Some(location) = report.latest_location {
        println!("breakpoint location: {location}");
    }
    println!("debug events: {}", report.dispatch.events);
}

/// Print the locations found by the sequential run.
pub fn print_sequential_report(report: &SequentialReport) {
    for location in &report.locations {
        println!("line: {}, column: {}", location.line, location.column);
    }
}
