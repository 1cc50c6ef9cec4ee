//! lockstep-protocol — debugger wire protocol for the lockstep session.
//!
//! This crate holds the JSON message types exchanged over an engine's
//! debug channel, the fixed-width transport codec, and the extraction of
//! resolved breakpoint locations from `setbreakpoint` responses.

pub mod breakpoint;
pub mod codec;
pub mod error;
pub mod protocol;

// Re-export key types for convenience.
pub use breakpoint::{extract, BreakpointBook, BreakpointLocation, TrackedBreakpoint};
pub use codec::{
    decode_message, decode_transport, encode_command, encode_request, TransportBuffer,
    DEFAULT_BUFFER_UNITS,
};
pub use error::ProtocolError;
pub use protocol::*;
