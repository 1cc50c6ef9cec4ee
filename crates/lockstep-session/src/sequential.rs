//! Single-threaded breakpoint simulation.
//!
//! One thread alternates between handler calls and `setbreakpoint`
//! commands. Responses are collected right after each pump without
//! waiting, since the pump delivers them synchronously.

use tokio::sync::oneshot::error::TryRecvError;

use lockstep_engine::{EngineHandle, HandlerFunction, ScriptEngine};
use lockstep_protocol::{
    encode_request, extract, BreakpointLocation, ProtocolCommand, SeqAllocator,
    SetBreakpointArguments,
};

use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::driver::build_request;
use crate::error::SessionError;
use crate::lifecycle::SessionOptions;

/// Iterations the simulation runs by default.
pub const SEQUENTIAL_ITERATIONS: u64 = 10;

/// What the sequential simulation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequentialReport {
    /// Handler calls made.
    pub calls: u64,
    /// Handler calls that raised an error.
    pub failures: u64,
    /// `setbreakpoint` commands sent.
    pub commands: u64,
    /// Locations extracted from the responses, in order.
    pub locations: Vec<BreakpointLocation>,
}

fn is_command_iteration(i: u64) -> bool {
    i != 0 && i % 5 == 0
}

pub(crate) fn run<E: ScriptEngine>(
    engine: &EngineHandle<E>,
    handler: &HandlerFunction,
    dispatcher: &Dispatcher,
    seqs: &SeqAllocator,
    options: &SessionOptions,
    iterations: u64,
) -> SequentialReport {
    let mut report = SequentialReport::default();

    for i in 0..iterations {
        if is_command_iteration(i) {
            report.commands += 1;
            match set_breakpoint(engine, dispatcher, seqs, options) {
                Ok(Some(location)) => {
                    tracing::info!(iteration = i, %location, "breakpoint location");
                    report.locations.push(location);
                }
                Ok(None) => tracing::warn!(iteration = i, "setbreakpoint response carried no location"),
                Err(err) => tracing::warn!(iteration = i, %err, "setbreakpoint failed"),
            }
            continue;
        }

        let request = build_request(&options.client, i);
        tracing::info!(%request, "calling {}", handler.name());
        let call = engine.with_engine(|engine| {
            let result = engine.call_function(handler, &request);
            if let Err(err) = engine.pump_debug_messages() {
                tracing::warn!(%err, "debug message pump failed");
            }
            result
        });
        report.calls += 1;
        match call {
            Ok(Ok(_)) => {}
            Ok(Err(err)) | Err(err) => {
                report.failures += 1;
                tracing::warn!(iteration = i, %err, "handler call failed");
            }
        }
    }
    report
}

fn set_breakpoint<E: ScriptEngine>(
    engine: &EngineHandle<E>,
    dispatcher: &Dispatcher,
    seqs: &SeqAllocator,
    options: &SessionOptions,
) -> Result<Option<BreakpointLocation>, SessionError> {
    let plan = &options.breakpoint;
    let args = SetBreakpointArguments::function(plan.target.as_str(), plan.line, plan.column);
    let command = ProtocolCommand::set_breakpoint(seqs.next_seq(), &args)?;
    let seq = command.seq;
    let buffer = encode_request(&command, options.command_buffer_units)?;

    let mut rx = dispatcher.register(seq, command.command);
    let sent = engine
        .with_engine(|engine| {
            engine.send_debug_command(buffer.terminated())?;
            engine.pump_debug_messages()
        })
        .and_then(|pumped| pumped);
    if let Err(err) = sent {
        dispatcher.cancel(seq);
        return Err(err.into());
    }

    match rx.try_recv() {
        Ok(DispatchResult::Success(message)) => Ok(extract(&message)?),
        Ok(DispatchResult::Failure(message)) => Err(SessionError::CommandFailed {
            command: command.command,
            seq,
            message: message.message.unwrap_or_default(),
        }),
        Err(TryRecvError::Empty) => {
            dispatcher.cancel(seq);
            Err(SessionError::Cancelled {
                command: command.command,
                seq,
            })
        }
        Err(TryRecvError::Closed) => Err(SessionError::Cancelled {
            command: command.command,
            seq,
        }),
    }
}
