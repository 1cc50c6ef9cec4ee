//! The scripting engine surface consumed by the session.

use std::sync::Arc;

use serde_json::Value;

use crate::error::EngineError;

/// Callback receiving every protocol message the engine produces, as raw
/// JSON text. Invoked synchronously on the thread that pumps messages.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Host function exposed to interpreted code. Receives the call's
/// arguments converted to JSON.
pub type NativeFunction = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Opaque handle to a resolved interpreted function.
///
/// Resolved once after the program loads and then reused for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFunction {
    name: String,
    slot: usize,
}

impl HandlerFunction {
    /// Create a handle. `slot` is engine-private bookkeeping.
    pub fn new(name: impl Into<String>, slot: usize) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }

    /// Name the function was resolved under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine-private slot identifying the function.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// A single-threaded, non-reentrant scripting engine.
///
/// Implementations are `Send` but not required to tolerate concurrent
/// entry; callers serialize access through [`EngineHandle`](crate::EngineHandle).
pub trait ScriptEngine: Send {
    /// Compile `source` and run its top level.
    fn compile_and_run(&self, name: &str, source: &str) -> Result<(), EngineError>;

    /// Look up a global function by name.
    fn resolve_global_function(&self, name: &str) -> Result<HandlerFunction, EngineError>;

    /// Call a resolved function with a single argument.
    fn call_function(&self, function: &HandlerFunction, arg: &Value) -> Result<Value, EngineError>;

    /// Queue a debugger command, given as zero-terminated UTF-16 code units.
    /// The response arrives later through the message handler.
    fn send_debug_command(&self, units: &[u16]) -> Result<(), EngineError>;

    /// Process queued commands and deliver every buffered message to the
    /// current handler. Returns the number of messages delivered.
    fn pump_debug_messages(&self) -> Result<usize, EngineError>;

    /// Install the message handler, replacing the previous one.
    fn set_debug_message_handler(&self, handler: Option<MessageHandler>);

    /// Expose a host function to interpreted code as a global.
    fn register_native(&self, name: &str, function: NativeFunction) -> Result<(), EngineError>;
}
