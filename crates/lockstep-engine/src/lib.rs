//! lockstep-engine — the shared scripting engine and its execution lock.
//!
//! Exposes the narrow [`ScriptEngine`] surface the session consumes, the
//! reentrant [`EngineHandle`]/[`EngineRef`] lock around the single engine
//! instance, an engine-side [`DebugAgent`] that services debugger
//! commands, and two engines: an embedded Lua interpreter and an
//! in-memory mock for tests.

pub mod agent;
pub mod engine;
pub mod error;
pub mod lock;
pub mod lua;
pub mod mock;

// Re-export key types for convenience.
pub use agent::{DebugAgent, FunctionLocator};
pub use engine::{HandlerFunction, MessageHandler, NativeFunction, ScriptEngine};
pub use error::EngineError;
pub use lock::{EngineHandle, EngineRef};
pub use lua::LuaEngine;
pub use mock::{EngineOp, MockEngine, MockFunction, MockProbe};
