//! Engine-side debug agent.
//!
//! Owns the breakpoint table, the inbox of queued commands and the outbox
//! of produced messages. Commands are only interpreted during a pump, and
//! messages are only handed to the handler during a pump, on the pumping
//! thread. Breakpoint hits reported while a function runs are buffered
//! as `break` events until the next pump.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use lockstep_protocol::{
    decode_transport, ActualLocation, BreakEventBody, ClearBreakpointArguments,
    ClearBreakpointBody, CommandKind, Event, ListBreakpointsBody, ListedBreakpoint, MessageType,
    ProtocolCommand, Response, SetBreakpointArguments, SetBreakpointBody, FUNCTION_TARGET,
};

use crate::engine::MessageHandler;
use crate::error::EngineError;

/// Resolves where a global function is defined in the loaded program.
pub trait FunctionLocator {
    /// 1-based line of the function's header, or a reason it has none.
    fn function_line(&self, name: &str) -> Result<i64, String>;

    /// Name of the loaded chunk defining `name`. `None` means hits are
    /// matched by line alone.
    fn function_script(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
struct AgentBreakpoint {
    id: i64,
    target: String,
    line: i64,
    column: i64,
    /// Chunk the target function was loaded from.
    script: Option<String>,
    /// 0-based script line the breakpoint resolved to.
    script_line: i64,
    hit_count: u64,
}

#[derive(Debug, Default)]
struct AgentState {
    inbox: VecDeque<String>,
    outbox: VecDeque<String>,
    breakpoints: BTreeMap<i64, AgentBreakpoint>,
    next_breakpoint: i64,
    next_seq: i64,
    at_break: bool,
}

impl AgentState {
    fn seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Debugger command processor shared by the engine implementations.
pub struct DebugAgent {
    state: Mutex<AgentState>,
    handler: Mutex<Option<MessageHandler>>,
    armed: AtomicUsize,
}

struct Reply {
    success: bool,
    message: Option<String>,
    body: Option<Value>,
}

impl Reply {
    fn ok(body: Option<Value>) -> Self {
        Self {
            success: true,
            message: None,
            body,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::error!(%err, "failed to serialize debug message; dropping it");
            None
        }
    }
}

fn to_body<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

impl DebugAgent {
    /// Create an agent with no breakpoints and no handler.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AgentState::default()),
            handler: Mutex::new(None),
            armed: AtomicUsize::new(0),
        }
    }

    /// Replace the message handler.
    pub fn set_handler(&self, handler: Option<MessageHandler>) {
        *self.handler.lock() = handler;
    }

    /// Queue a command received as zero-terminated UTF-16.
    pub fn queue_command(&self, units: &[u16]) -> Result<(), EngineError> {
        let text = decode_transport(units)?;
        tracing::trace!(command = %text, "debug command queued");
        self.state.lock().inbox.push_back(text);
        Ok(())
    }

    /// Whether any breakpoint is set. Cheap; safe to call from line hooks.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed) > 0
    }

    /// Whether a breakpoint fired and no `continue` followed.
    pub fn at_break(&self) -> bool {
        self.state.lock().at_break
    }

    /// Number of commands waiting for a pump.
    pub fn queued_commands(&self) -> usize {
        self.state.lock().inbox.len()
    }

    /// Report that execution reached 0-based `script_line` of the chunk
    /// named `script`.
    pub fn hit_line(&self, script: &str, script_line: i64) {
        self.hit_where(|bp| {
            bp.script_line == script_line && bp.script.as_deref().map_or(true, |s| s == script)
        });
    }

    /// Report that execution entered the function `name`.
    pub fn hit_function(&self, name: &str) {
        self.hit_where(|bp| bp.target == name);
    }

    fn hit_where(&self, matches: impl Fn(&AgentBreakpoint) -> bool) {
        if !self.is_armed() {
            return;
        }
        let mut state = self.state.lock();
        let mut hit: Vec<i64> = Vec::new();
        let mut first: Option<(String, i64, i64)> = None;
        for bp in state.breakpoints.values_mut().filter(|bp| matches(&**bp)) {
            bp.hit_count += 1;
            hit.push(bp.id);
            if first.is_none() {
                first = Some((bp.target.clone(), bp.script_line, bp.column));
            }
        }
        let Some((target, source_line, source_column)) = first else {
            return;
        };
        state.at_break = true;
        let seq = state.seq();
        let event = Event {
            seq,
            message_type: MessageType::Event,
            event: "break".into(),
            body: to_body(&BreakEventBody {
                invocation_text: target,
                source_line,
                source_column,
                breakpoints: hit,
            }),
        };
        if let Some(text) = to_json(&event) {
            state.outbox.push_back(text);
        }
    }

    /// Interpret queued commands, then hand every buffered message to the
    /// handler. Returns how many messages were delivered.
    pub fn pump(&self, locator: &dyn FunctionLocator) -> usize {
        self.process_commands(locator);
        self.deliver()
    }

    /// Interpret every queued command, producing responses in the outbox.
    pub fn process_commands(&self, locator: &dyn FunctionLocator) -> usize {
        let queued: Vec<String> = self.state.lock().inbox.drain(..).collect();
        let count = queued.len();
        for text in queued {
            self.process_one(&text, locator);
        }
        count
    }

    /// Hand buffered messages to the handler. Messages produced with no
    /// handler installed are discarded.
    pub fn deliver(&self) -> usize {
        let messages: Vec<String> = self.state.lock().outbox.drain(..).collect();
        if messages.is_empty() {
            return 0;
        }
        let handler = self.handler.lock().clone();
        let Some(handler) = handler else {
            tracing::debug!(count = messages.len(), "no debug message handler; dropping messages");
            return 0;
        };
        for message in &messages {
            handler(message);
        }
        messages.len()
    }

    /// Snapshot of the breakpoint table.
    pub fn breakpoints(&self) -> Vec<ListedBreakpoint> {
        self.state
            .lock()
            .breakpoints
            .values()
            .map(|bp| ListedBreakpoint {
                number: bp.id,
                target_type: FUNCTION_TARGET.into(),
                target: bp.target.clone(),
                line: bp.line,
                column: bp.column,
                hit_count: bp.hit_count,
                active: true,
            })
            .collect()
    }

    fn process_one(&self, text: &str, locator: &dyn FunctionLocator) {
        let (seq, name, reply) = match serde_json::from_str::<ProtocolCommand>(text) {
            Ok(command) => {
                let reply = match command.command {
                    CommandKind::SetBreakpoint => self.set_breakpoint(&command, locator),
                    CommandKind::ListBreakpoints => self.list_breakpoints(),
                    CommandKind::ClearBreakpoint => self.clear_breakpoint(&command),
                    CommandKind::Continue => self.resume(),
                };
                (command.seq, command.command.as_str().to_string(), reply)
            }
            Err(err) => {
                let value: Value = serde_json::from_str(text).unwrap_or(Value::Null);
                let seq = value.get("seq").and_then(Value::as_i64).unwrap_or(0);
                let name = value
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                tracing::debug!(%err, command = %name, "rejecting debug command");
                (seq, name, Reply::fail(format!("Unrecognized command: {err}")))
            }
        };

        let mut state = self.state.lock();
        let response = Response {
            seq: state.seq(),
            message_type: MessageType::Response,
            request_seq: seq,
            command: name,
            success: reply.success,
            running: !state.at_break,
            message: reply.message,
            body: reply.body,
        };
        if let Some(text) = to_json(&response) {
            state.outbox.push_back(text);
        }
    }

    fn set_breakpoint(&self, command: &ProtocolCommand, locator: &dyn FunctionLocator) -> Reply {
        let Some(arguments) = command.arguments.clone() else {
            return Reply::fail("Missing arguments");
        };
        let args: SetBreakpointArguments = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return Reply::fail(format!("Invalid arguments: {e}")),
        };
        if args.target_type != FUNCTION_TARGET {
            return Reply::fail(format!("Unsupported breakpoint type: {}", args.target_type));
        }
        let header = match locator.function_line(&args.target) {
            Ok(line) => line,
            Err(reason) => return Reply::fail(reason),
        };

        let line = args.line.unwrap_or(0);
        let column = args.column.unwrap_or(0);
        let Some(script_line) = header.checked_sub(1).and_then(|h| h.checked_add(line)) else {
            return Reply::fail("Invalid line offset");
        };
        let script = locator.function_script(&args.target);

        let mut state = self.state.lock();
        state.next_breakpoint += 1;
        let id = state.next_breakpoint;
        state.breakpoints.insert(
            id,
            AgentBreakpoint {
                id,
                target: args.target.clone(),
                line,
                column,
                script,
                script_line,
                hit_count: 0,
            },
        );
        self.armed.store(state.breakpoints.len(), Ordering::Relaxed);
        tracing::debug!(id, target = %args.target, script_line, "breakpoint set");

        Reply::ok(to_body(&SetBreakpointBody {
            target_type: FUNCTION_TARGET.into(),
            breakpoint: id,
            line,
            column,
            actual_locations: vec![ActualLocation {
                line: script_line,
                column,
            }],
        }))
    }

    fn list_breakpoints(&self) -> Reply {
        Reply::ok(to_body(&ListBreakpointsBody {
            breakpoints: self.breakpoints(),
        }))
    }

    fn clear_breakpoint(&self, command: &ProtocolCommand) -> Reply {
        let args: ClearBreakpointArguments = match command
            .arguments
            .clone()
            .map(serde_json::from_value)
        {
            Some(Ok(args)) => args,
            Some(Err(e)) => return Reply::fail(format!("Invalid arguments: {e}")),
            None => return Reply::fail("Missing arguments"),
        };

        let mut state = self.state.lock();
        if state.breakpoints.remove(&args.breakpoint).is_none() {
            return Reply::fail(format!("Unknown breakpoint {}", args.breakpoint));
        }
        self.armed.store(state.breakpoints.len(), Ordering::Relaxed);
        tracing::debug!(id = args.breakpoint, "breakpoint cleared");

        Reply::ok(to_body(&ClearBreakpointBody {
            target_type: FUNCTION_TARGET.into(),
            breakpoint: args.breakpoint,
        }))
    }

    fn resume(&self) -> Reply {
        self.state.lock().at_break = false;
        Reply::ok(None)
    }
}

impl Default for DebugAgent {
    fn default() -> Self {
        Self::new()
    }
}
