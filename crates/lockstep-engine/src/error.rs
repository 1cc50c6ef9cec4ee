//! Engine error types.

use std::time::Duration;

use lockstep_protocol::ProtocolError;
use thiserror::Error;

/// Errors from engine operations and from the execution lock.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Program text failed to compile.
    #[error("compile error: {0}")]
    Compile(String),

    /// Interpreted code raised an error.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// No global with the requested name exists.
    #[error("global `{0}` not found")]
    NotFound(String),

    /// The global exists but cannot be called.
    #[error("global `{name}` is a {kind}, not a function")]
    NotCallable {
        /// Global name.
        name: String,
        /// Engine type name of the value found.
        kind: String,
    },

    /// A value could not cross the host/engine boundary.
    #[error("value conversion failed: {0}")]
    Conversion(String),

    /// The debug channel received bytes it could not interpret.
    #[error("debug channel error: {0}")]
    DebugChannel(#[from] ProtocolError),

    /// The engine instance has already been disposed.
    #[error("engine has been disposed")]
    Disposed,

    /// The engine is borrowed by the current thread.
    #[error("engine is in use by the current thread")]
    Busy,

    /// The execution lock could not be acquired in time.
    #[error("timed out after {0:?} waiting for the engine lock")]
    LockTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_not_callable_display() {
        let err = EngineError::NotCallable {
            name: "DebugUserRequest".into(),
            kind: "number".into(),
        };
        assert_eq!(
            err.to_string(),
            "global `DebugUserRequest` is a number, not a function"
        );
    }

    #[test]
    fn error_not_found_display() {
        let err = EngineError::NotFound("handler".into());
        assert_eq!(err.to_string(), "global `handler` not found");
    }

    #[test]
    fn error_lock_timeout_display() {
        let err = EngineError::LockTimeout(Duration::from_millis(50));
        assert_eq!(
            err.to_string(),
            "timed out after 50ms waiting for the engine lock"
        );
    }

    #[test]
    fn error_from_protocol_error() {
        let err: EngineError = ProtocolError::MalformedProtocolMessage("bad".into()).into();
        assert!(matches!(err, EngineError::DebugChannel(_)));
        assert!(err.to_string().contains("bad"));
    }
}
