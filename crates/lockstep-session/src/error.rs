//! Session error types.

use lockstep_engine::EngineError;
use lockstep_protocol::{CommandKind, ProtocolError};
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors surfaced by session components.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The engine could not be prepared. Fatal.
    #[error("bootstrap failed: {0}")]
    BootstrapFailure(String),

    /// No response arrived for a command within the bound.
    #[error("`{command}` (seq {seq}) timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Command that was sent.
        command: CommandKind,
        /// Its sequence number.
        seq: i64,
        /// The bound that elapsed.
        timeout_ms: u64,
    },

    /// The engine answered with `success: false`.
    #[error("`{command}` (seq {seq}) failed: {message}")]
    CommandFailed {
        /// Command that was sent.
        command: CommandKind,
        /// Its sequence number.
        seq: i64,
        /// Engine-provided reason.
        message: String,
    },

    /// The pending entry was dropped before a response arrived.
    #[error("`{command}` (seq {seq}) was cancelled")]
    Cancelled {
        /// Command that was sent.
        command: CommandKind,
        /// Its sequence number.
        seq: i64,
    },

    /// The coordinator was asked to move to a state it cannot reach.
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },

    /// Encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An engine operation failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A spawned activity panicked or was aborted.
    #[error("activity failed: {0}")]
    Join(String),
}

impl SessionError {
    /// Whether the process should stop because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::BootstrapFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_timeout_display() {
        let err = SessionError::CommandTimeout {
            command: CommandKind::ListBreakpoints,
            seq: 3,
            timeout_ms: 2000,
        };
        assert_eq!(
            err.to_string(),
            "`listbreakpoints` (seq 3) timed out after 2000ms"
        );
    }

    #[test]
    fn error_command_failed_display() {
        let err = SessionError::CommandFailed {
            command: CommandKind::ClearBreakpoint,
            seq: 10,
            message: "Unknown breakpoint 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "`clearbreakpoint` (seq 10) failed: Unknown breakpoint 1"
        );
    }

    #[test]
    fn error_transition_display() {
        let err = SessionError::InvalidTransition {
            from: LifecycleState::Stopped,
            to: LifecycleState::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from stopped to running"
        );
    }

    #[test]
    fn error_only_bootstrap_is_fatal() {
        assert!(SessionError::BootstrapFailure("x".into()).is_fatal());
        assert!(!SessionError::Engine(EngineError::Disposed).is_fatal());
        assert!(!SessionError::Cancelled {
            command: CommandKind::Continue,
            seq: 1
        }
        .is_fatal());
    }

    #[test]
    fn error_from_engine_and_protocol() {
        let err: SessionError = EngineError::Busy.into();
        assert!(matches!(err, SessionError::Engine(EngineError::Busy)));
        let err: SessionError = ProtocolError::MissingField { field: "body.line" }.into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
