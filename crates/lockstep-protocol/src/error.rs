//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding commands or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The encoded command does not fit the destination transport buffer.
    #[error("encoded command needs {needed} code units, buffer holds {capacity}")]
    EncodingOverflow {
        /// Code units required, terminator included.
        needed: usize,
        /// Capacity of the destination buffer.
        capacity: usize,
    },

    /// Inbound text is not valid JSON or lacks a required field.
    #[error("malformed protocol message: {0}")]
    MalformedProtocolMessage(String),

    /// A body field was absent or had the wrong type.
    #[error("missing or non-integer field: {field}")]
    MissingField {
        /// Dotted path of the field (e.g. `body.line`).
        field: &'static str,
    },

    /// An outbound value could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
