//! Control activities: one debugger command each.
//!
//! Every operation builds a command with a fresh sequence number,
//! registers it with the dispatcher, sends it under the engine lock,
//! pumps so the response is delivered, then waits for the correlated
//! response with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;

use lockstep_engine::{EngineRef, ScriptEngine};
use lockstep_protocol::{
    encode_request, extract, BreakpointBook, BreakpointLocation, ListBreakpointsBody,
    ListedBreakpoint, ProtocolCommand, ProtocolError, ProtocolMessage, SeqAllocator,
    SetBreakpointArguments, SetBreakpointBody, TrackedBreakpoint,
};

use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::error::SessionError;

/// Default bound on waiting for a response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// A breakpoint the engine accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointSet {
    /// Engine-assigned id.
    pub id: i64,
    /// Location reported in the response.
    pub location: BreakpointLocation,
}

/// Issues debugger commands against the shared engine.
pub struct ControlClient<E> {
    engine: EngineRef<E>,
    dispatcher: Arc<Dispatcher>,
    seqs: Arc<SeqAllocator>,
    book: Arc<Mutex<BreakpointBook>>,
    timeout: Duration,
    buffer_units: usize,
}

impl<E> Clone for ControlClient<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            seqs: Arc::clone(&self.seqs),
            book: Arc::clone(&self.book),
            timeout: self.timeout,
            buffer_units: self.buffer_units,
        }
    }
}

impl<E: ScriptEngine + 'static> ControlClient<E> {
    /// Create a client. The dispatcher must already be installed as the
    /// engine's message handler.
    pub fn new(
        engine: EngineRef<E>,
        dispatcher: Arc<Dispatcher>,
        seqs: Arc<SeqAllocator>,
        book: Arc<Mutex<BreakpointBook>>,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            seqs,
            book,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            buffer_units: lockstep_protocol::DEFAULT_BUFFER_UNITS,
        }
    }

    /// Bound on waiting for each response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capacity of the command transport buffer, in UTF-16 units.
    pub fn with_buffer_units(mut self, units: usize) -> Self {
        self.buffer_units = units;
        self
    }

    /// Breakpoints acknowledged so far.
    pub fn breakpoints(&self) -> Vec<TrackedBreakpoint> {
        self.book.lock().all().cloned().collect()
    }

    /// Place a function breakpoint.
    pub async fn set_breakpoint(
        &self,
        target: &str,
        line: i64,
        column: i64,
    ) -> Result<BreakpointSet, SessionError> {
        let args = SetBreakpointArguments::function(target, line, column);
        let command = ProtocolCommand::set_breakpoint(self.seqs.next_seq(), &args)?;
        let response = self.execute(command).await?;

        let location = extract(&response)?
            .ok_or(ProtocolError::MissingField { field: "body.type" })?;
        let body: SetBreakpointBody = response.body_as()?;
        self.book.lock().add(TrackedBreakpoint {
            id: body.breakpoint,
            target: target.to_string(),
            location,
        });
        tracing::info!(id = body.breakpoint, target, %location, "breakpoint set");
        Ok(BreakpointSet {
            id: body.breakpoint,
            location,
        })
    }

    /// Enumerate the engine's breakpoints.
    pub async fn list_breakpoints(&self) -> Result<Vec<ListedBreakpoint>, SessionError> {
        let command = ProtocolCommand::list_breakpoints(self.seqs.next_seq());
        let response = self.execute(command).await?;
        let body: ListBreakpointsBody = response.body_as()?;
        tracing::info!(count = body.breakpoints.len(), "breakpoints listed");
        Ok(body.breakpoints)
    }

    /// Remove a breakpoint by id.
    pub async fn clear_breakpoint(&self, id: i64) -> Result<(), SessionError> {
        let command = ProtocolCommand::clear_breakpoint(self.seqs.next_seq(), id)?;
        self.execute(command).await?;
        self.book.lock().remove(id);
        tracing::info!(id, "breakpoint cleared");
        Ok(())
    }

    /// Resume after a break. Returns the engine's running flag.
    pub async fn continue_execution(&self) -> Result<bool, SessionError> {
        let command = ProtocolCommand::continue_execution(self.seqs.next_seq());
        let response = self.execute(command).await?;
        let running = response.running.unwrap_or(true);
        tracing::info!(running, "execution continued");
        Ok(running)
    }

    async fn execute(&self, command: ProtocolCommand) -> Result<ProtocolMessage, SessionError> {
        let seq = command.seq;
        let kind = command.command;
        let buffer = encode_request(&command, self.buffer_units)?;

        let rx = self.dispatcher.register(seq, kind);
        tracing::debug!(seq, command = %kind, "sending debug command");

        let engine = self.engine.clone();
        let sent = tokio::task::spawn_blocking(move || {
            engine
                .with_engine(|engine| {
                    engine.send_debug_command(buffer.terminated())?;
                    engine.pump_debug_messages()
                })
                .and_then(|pumped| pumped)
        })
        .await;

        match sent {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                self.dispatcher.cancel(seq);
                return Err(err.into());
            }
            Err(err) => {
                self.dispatcher.cancel(seq);
                return Err(SessionError::Join(err.to_string()));
            }
        }

        match timeout(self.timeout, rx).await {
            Ok(Ok(DispatchResult::Success(message))) => Ok(message),
            Ok(Ok(DispatchResult::Failure(message))) => Err(SessionError::CommandFailed {
                command: kind,
                seq,
                message: message
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            }),
            Ok(Err(_)) => Err(SessionError::Cancelled { command: kind, seq }),
            Err(_) => {
                self.dispatcher.cancel(seq);
                tracing::warn!(seq, command = %kind, "debug command timed out");
                Err(SessionError::CommandTimeout {
                    command: kind,
                    seq,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}
