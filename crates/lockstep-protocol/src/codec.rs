//! Wire codec for the engine debug channel.
//!
//! Outbound commands travel as a zero-terminated buffer of UTF-16 code
//! units with a fixed capacity. Inbound messages arrive as JSON text.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{MessageType, ProtocolCommand, ProtocolMessage};

/// Default capacity of a command buffer, in UTF-16 code units.
pub const DEFAULT_BUFFER_UNITS: usize = 1000;

/// An encoded command ready for the engine's debug channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportBuffer {
    units: Vec<u16>,
    capacity: usize,
}

impl TransportBuffer {
    /// Payload code units, without the terminator.
    pub fn units(&self) -> &[u16] {
        &self.units[..self.len()]
    }

    /// Payload plus the trailing zero unit.
    pub fn terminated(&self) -> &[u16] {
        &self.units
    }

    /// Number of payload code units.
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the buffer was validated against.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Encode command text into a transport buffer of `capacity` code units.
///
/// The terminator counts against the capacity.
pub fn encode_command(text: &str, capacity: usize) -> Result<TransportBuffer, ProtocolError> {
    let needed = text.encode_utf16().count() + 1;
    if needed > capacity {
        return Err(ProtocolError::EncodingOverflow { needed, capacity });
    }
    let mut units = Vec::with_capacity(needed);
    units.extend(text.encode_utf16());
    units.push(0);
    Ok(TransportBuffer { units, capacity })
}

/// Serialize and encode a command in one step.
pub fn encode_request(
    command: &ProtocolCommand,
    capacity: usize,
) -> Result<TransportBuffer, ProtocolError> {
    encode_command(&command.to_json()?, capacity)
}

/// Recover command text from code units, stopping at the first zero.
pub fn decode_transport(units: &[u16]) -> Result<String, ProtocolError> {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end])
        .map_err(|e| ProtocolError::MalformedProtocolMessage(format!("invalid UTF-16: {e}")))
}

/// Decode an inbound JSON message.
///
/// `type` is always required. Requests and responses need `command`;
/// events are named by `event` (or `command` when `event` is absent).
pub fn decode_message(raw: &str) -> Result<ProtocolMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProtocolError::MalformedProtocolMessage(format!("invalid JSON: {e}")))?;
    let obj = value.as_object().ok_or_else(|| {
        ProtocolError::MalformedProtocolMessage("message is not a JSON object".into())
    })?;

    let type_name = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
        ProtocolError::MalformedProtocolMessage("missing string field `type`".into())
    })?;
    let message_type = MessageType::parse(type_name).ok_or_else(|| {
        ProtocolError::MalformedProtocolMessage(format!("unknown message type `{type_name}`"))
    })?;

    let name = match message_type {
        MessageType::Event => obj.get("event").or_else(|| obj.get("command")),
        MessageType::Request | MessageType::Response => obj.get("command"),
    };
    let command = name.and_then(Value::as_str).ok_or_else(|| {
        ProtocolError::MalformedProtocolMessage(format!(
            "{type_name} message has no string `command`"
        ))
    })?;

    let message = ProtocolMessage {
        seq: obj.get("seq").and_then(Value::as_i64).unwrap_or(0),
        message_type,
        command: command.to_string(),
        request_seq: obj.get("request_seq").and_then(Value::as_i64),
        success: obj.get("success").and_then(Value::as_bool),
        running: obj.get("running").and_then(Value::as_bool),
        message: obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        body: obj.get("body").cloned(),
        raw: raw.to_string(),
    };
    tracing::trace!(seq = message.seq, command = %message.command, "decoded protocol message");
    Ok(message)
}
