//! Debugger protocol message types.
//!
//! Models the JSON command/response/event messages carried over an
//! engine's debug channel, with serde Serialize/Deserialize support.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// The `type` field of every protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// A command sent to the engine.
    Request,
    /// The engine's answer to a request.
    Response,
    /// An unsolicited notification (e.g. `break`).
    Event,
}

impl MessageType {
    /// Wire name of this message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Event => "event",
        }
    }

    /// Parse a wire name. Returns `None` for unknown values.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "request" => Some(MessageType::Request),
            "response" => Some(MessageType::Response),
            "event" => Some(MessageType::Event),
            _ => None,
        }
    }
}

/// The debugger commands understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Place a function breakpoint.
    SetBreakpoint,
    /// Enumerate active breakpoints.
    ListBreakpoints,
    /// Remove a breakpoint by id.
    ClearBreakpoint,
    /// Resume execution after a break.
    Continue,
}

impl CommandKind {
    /// Wire name of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SetBreakpoint => "setbreakpoint",
            CommandKind::ListBreakpoints => "listbreakpoints",
            CommandKind::ClearBreakpoint => "clearbreakpoint",
            CommandKind::Continue => "continue",
        }
    }

    /// Parse a wire name. Returns `None` for commands outside this set.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "setbreakpoint" => Some(CommandKind::SetBreakpoint),
            "listbreakpoints" => Some(CommandKind::ListBreakpoints),
            "clearbreakpoint" => Some(CommandKind::ClearBreakpoint),
            "continue" => Some(CommandKind::Continue),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// A request sent over the debug channel. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCommand {
    /// Sequence number, unique within the session.
    pub seq: i64,
    /// Always [`MessageType::Request`].
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// The command to execute.
    pub command: CommandKind,
    /// Command arguments (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl ProtocolCommand {
    /// Build a request with raw arguments.
    pub fn new(seq: i64, command: CommandKind, arguments: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            message_type: MessageType::Request,
            command,
            arguments,
        }
    }

    /// Build a `setbreakpoint` request.
    pub fn set_breakpoint(seq: i64, args: &SetBreakpointArguments) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            seq,
            CommandKind::SetBreakpoint,
            Some(serde_json::to_value(args)?),
        ))
    }

    /// Build a `listbreakpoints` request.
    pub fn list_breakpoints(seq: i64) -> Self {
        Self::new(seq, CommandKind::ListBreakpoints, None)
    }

    /// Build a `clearbreakpoint` request.
    pub fn clear_breakpoint(seq: i64, breakpoint: i64) -> Result<Self, ProtocolError> {
        let args = ClearBreakpointArguments {
            target_type: FUNCTION_TARGET.into(),
            breakpoint,
        };
        Ok(Self::new(
            seq,
            CommandKind::ClearBreakpoint,
            Some(serde_json::to_value(args)?),
        ))
    }

    /// Build a `continue` request.
    pub fn continue_execution(seq: i64) -> Self {
        Self::new(seq, CommandKind::Continue, None)
    }

    /// Serialize to the JSON text carried on the wire.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Breakpoint target kind used by every command in this protocol.
pub const FUNCTION_TARGET: &str = "function";

/// Arguments for `setbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointArguments {
    /// Target kind; only `"function"` is supported.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Name of the global function to break in.
    pub target: String,
    /// Line offset from the start of the function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Column offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

impl SetBreakpointArguments {
    /// Function breakpoint on `target` at the given offset.
    pub fn function(target: impl Into<String>, line: i64, column: i64) -> Self {
        Self {
            target_type: FUNCTION_TARGET.into(),
            target: target.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

/// Arguments for `clearbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearBreakpointArguments {
    /// Target kind; only `"function"` is supported.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Id of the breakpoint to remove.
    pub breakpoint: i64,
}

// ---------------------------------------------------------------------------
// Engine-produced messages
// ---------------------------------------------------------------------------

/// A response produced by the engine's debug agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this message.
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Sequence number of the request being answered.
    pub request_seq: i64,
    /// The command this response is for.
    pub command: String,
    /// Whether the request was successful.
    pub success: bool,
    /// Whether the engine is running after the command.
    pub running: bool,
    /// Error message if `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body (command-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// An event produced by the engine's debug agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// The event name (e.g. `break`).
    pub event: String,
    /// Event body (event-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A resolved script position reported in `actual_locations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLocation {
    /// 0-based script line.
    pub line: i64,
    /// 0-based column.
    pub column: i64,
}

/// Body of a successful `setbreakpoint` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointBody {
    /// Target kind echoed from the request.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Engine-assigned breakpoint id.
    pub breakpoint: i64,
    /// Line offset echoed from the request.
    pub line: i64,
    /// Column offset echoed from the request.
    pub column: i64,
    /// Script positions the breakpoint resolved to.
    pub actual_locations: Vec<ActualLocation>,
}

/// One entry of a `listbreakpoints` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedBreakpoint {
    /// Breakpoint id.
    pub number: i64,
    /// Target kind.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Function name.
    pub target: String,
    /// Line offset.
    pub line: i64,
    /// Column offset.
    pub column: i64,
    /// How many times the breakpoint fired.
    pub hit_count: u64,
    /// Whether the breakpoint is armed.
    pub active: bool,
}

/// Body of a `listbreakpoints` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListBreakpointsBody {
    /// All breakpoints known to the engine.
    pub breakpoints: Vec<ListedBreakpoint>,
}

/// Body of a `clearbreakpoint` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearBreakpointBody {
    /// Target kind.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Id of the removed breakpoint.
    pub breakpoint: i64,
}

/// Body of a `break` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEventBody {
    /// Name of the function being executed.
    pub invocation_text: String,
    /// 0-based script line where execution stopped.
    pub source_line: i64,
    /// 0-based column.
    pub source_column: i64,
    /// Ids of the breakpoints that fired.
    pub breakpoints: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A decoded inbound message. Only lives as long as the dispatcher
/// invocation unless fields are copied out.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    /// Sequence number of the message (0 when absent).
    pub seq: i64,
    /// Request, response or event.
    pub message_type: MessageType,
    /// Command name; for events, the event name.
    pub command: String,
    /// Seq of the request a response answers.
    pub request_seq: Option<i64>,
    /// Response success flag.
    pub success: Option<bool>,
    /// Engine running flag.
    pub running: Option<bool>,
    /// Failure description.
    pub message: Option<String>,
    /// Command-specific body.
    pub body: Option<serde_json::Value>,
    /// The JSON text exactly as received.
    pub raw: String,
}

impl ProtocolMessage {
    /// The command as a known [`CommandKind`], if it is one.
    pub fn command_kind(&self) -> Option<CommandKind> {
        CommandKind::parse(&self.command)
    }

    /// Whether this is a response message.
    pub fn is_response(&self) -> bool {
        self.message_type == MessageType::Response
    }

    /// Whether this is an event message.
    pub fn is_event(&self) -> bool {
        self.message_type == MessageType::Event
    }

    /// Responses without an explicit `success` flag count as successful.
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(true)
    }

    /// Deserialize the body into a typed value.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let body = self.body.clone().ok_or_else(|| {
            ProtocolError::MalformedProtocolMessage(format!("`{}` message has no body", self.command))
        })?;
        serde_json::from_value(body)
            .map_err(|e| ProtocolError::MalformedProtocolMessage(format!("bad body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Sequence numbers
// ---------------------------------------------------------------------------

/// Per-session monotonic sequence number source, shared across threads.
#[derive(Debug)]
pub struct SeqAllocator {
    next: AtomicI64,
}

impl SeqAllocator {
    /// Allocator whose first number is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first number is `first`.
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Allocate the next sequence number.
    pub fn next_seq(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SeqAllocator {
    fn default() -> Self {
        Self::new()
    }
}
