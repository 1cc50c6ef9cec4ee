//! In-memory engine for tests.
//!
//! Globals are configured up front with builder methods; `compile_and_run`
//! only records the program. Every entry into the engine is counted, and
//! an entry that begins while another is still in progress is recorded as
//! an overlap, which is how tests observe a broken execution lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::agent::{DebugAgent, FunctionLocator};
use crate::engine::{HandlerFunction, MessageHandler, NativeFunction, ScriptEngine};
use crate::error::EngineError;

/// Body of a mock global function.
pub type MockFunction = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

enum Global {
    Function { line: i64, body: MockFunction },
    Value(Value),
}

/// One recorded engine entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    /// `compile_and_run` with the program name.
    CompileAndRun(String),
    /// `resolve_global_function` with the global name.
    Resolve(String),
    /// `call_function` with the function name and argument.
    Call(String, Value),
    /// `send_debug_command` with the decoded command text.
    SendCommand(String),
    /// `pump_debug_messages` with the number of messages delivered.
    Pump(usize),
    /// `set_debug_message_handler`; `true` when a handler was installed.
    SetHandler(bool),
}

/// Shared view of a [`MockEngine`]'s recordings that stays valid after the
/// engine moves behind a lock or is disposed.
#[derive(Clone, Default)]
pub struct MockProbe {
    ops: Arc<Mutex<Vec<EngineOp>>>,
    inside: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

impl MockProbe {
    /// Entries that started while another entry was in progress.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Every recorded entry, in order.
    pub fn operations(&self) -> Vec<EngineOp> {
        self.ops.lock().clone()
    }

    /// Arguments of every call to the function `name`, in order.
    pub fn calls(&self, name: &str) -> Vec<Value> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                EngineOp::Call(called, arg) if called == name => Some(arg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Command texts received over the debug channel, in order.
    pub fn commands(&self) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                EngineOp::SendCommand(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: EngineOp) {
        self.ops.lock().push(op);
    }
}

struct Entry<'a> {
    inside: &'a AtomicUsize,
}

impl Drop for Entry<'_> {
    fn drop(&mut self) {
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable stand-in for [`LuaEngine`](crate::LuaEngine).
pub struct MockEngine {
    globals: Mutex<HashMap<String, Global>>,
    resolved: Mutex<Vec<String>>,
    natives: Mutex<HashMap<String, NativeFunction>>,
    programs: Mutex<Vec<String>>,
    agent: DebugAgent,
    probe: MockProbe,
    entry_delay: Option<Duration>,
    compile_error: Option<String>,
}

impl MockEngine {
    /// An engine with no globals.
    pub fn new() -> Self {
        Self {
            globals: Mutex::new(HashMap::new()),
            resolved: Mutex::new(Vec::new()),
            natives: Mutex::new(HashMap::new()),
            programs: Mutex::new(Vec::new()),
            agent: DebugAgent::new(),
            probe: MockProbe::default(),
            entry_delay: None,
            compile_error: None,
        }
    }

    /// Define a global function whose header sits on 1-based `line`.
    pub fn with_function<F>(self, name: &str, line: i64, body: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.globals.lock().insert(
            name.to_string(),
            Global::Function {
                line,
                body: Arc::new(body),
            },
        );
        self
    }

    /// Define a non-callable global.
    pub fn with_global(self, name: &str, value: Value) -> Self {
        self.globals
            .lock()
            .insert(name.to_string(), Global::Value(value));
        self
    }

    /// Sleep this long inside every entry, widening race windows.
    pub fn with_entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay = Some(delay);
        self
    }

    /// Make `compile_and_run` fail with `message`.
    pub fn with_compile_error(mut self, message: &str) -> Self {
        self.compile_error = Some(message.to_string());
        self
    }

    /// Recordings shared with the caller.
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    /// Entries that started while another entry was in progress.
    pub fn overlaps(&self) -> usize {
        self.probe.overlaps()
    }

    /// Every recorded entry, in order.
    pub fn operations(&self) -> Vec<EngineOp> {
        self.probe.operations()
    }

    /// Arguments of every call to the function `name`.
    pub fn calls(&self, name: &str) -> Vec<Value> {
        self.probe.calls(name)
    }

    /// Names of the programs passed to `compile_and_run`.
    pub fn programs(&self) -> Vec<String> {
        self.programs.lock().clone()
    }

    /// Invoke a registered host function as interpreted code would.
    pub fn invoke_native(&self, name: &str, args: &[Value]) -> Result<(), EngineError> {
        let native = self
            .natives
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        native(args);
        Ok(())
    }

    /// The engine's debug agent.
    pub fn agent(&self) -> &DebugAgent {
        &self.agent
    }

    fn enter(&self) -> Entry<'_> {
        if self.probe.inside.fetch_add(1, Ordering::SeqCst) > 0 {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.entry_delay {
            std::thread::sleep(delay);
        }
        Entry {
            inside: &self.probe.inside,
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "table",
    }
}

impl FunctionLocator for MockEngine {
    fn function_line(&self, name: &str) -> Result<i64, String> {
        match self.globals.lock().get(name) {
            Some(Global::Function { line, .. }) => Ok(*line),
            Some(Global::Value(_)) => Err(format!("{name} is not a function")),
            None => Err(format!("Unknown function {name}")),
        }
    }
}

impl ScriptEngine for MockEngine {
    fn compile_and_run(&self, name: &str, _source: &str) -> Result<(), EngineError> {
        let _entry = self.enter();
        self.probe.record(EngineOp::CompileAndRun(name.to_string()));
        if let Some(message) = &self.compile_error {
            return Err(EngineError::Compile(message.clone()));
        }
        self.programs.lock().push(name.to_string());
        Ok(())
    }

    fn resolve_global_function(&self, name: &str) -> Result<HandlerFunction, EngineError> {
        let _entry = self.enter();
        self.probe.record(EngineOp::Resolve(name.to_string()));
        match self.globals.lock().get(name) {
            Some(Global::Function { .. }) => {}
            Some(Global::Value(value)) => {
                return Err(EngineError::NotCallable {
                    name: name.to_string(),
                    kind: kind_of(value).to_string(),
                })
            }
            None => return Err(EngineError::NotFound(name.to_string())),
        }
        let mut resolved = self.resolved.lock();
        resolved.push(name.to_string());
        Ok(HandlerFunction::new(name, resolved.len() - 1))
    }

    fn call_function(&self, function: &HandlerFunction, arg: &Value) -> Result<Value, EngineError> {
        let _entry = self.enter();
        self.probe
            .record(EngineOp::Call(function.name().to_string(), arg.clone()));
        let name = self
            .resolved
            .lock()
            .get(function.slot())
            .cloned()
            .ok_or_else(|| EngineError::NotFound(function.name().to_string()))?;
        let body = match self.globals.lock().get(&name) {
            Some(Global::Function { body, .. }) => Arc::clone(body),
            _ => return Err(EngineError::NotFound(name)),
        };
        self.agent.hit_function(&name);
        body(arg).map_err(EngineError::Runtime)
    }

    fn send_debug_command(&self, units: &[u16]) -> Result<(), EngineError> {
        let _entry = self.enter();
        let text = lockstep_protocol::decode_transport(units)?;
        self.probe.record(EngineOp::SendCommand(text));
        self.agent.queue_command(units)
    }

    fn pump_debug_messages(&self) -> Result<usize, EngineError> {
        let _entry = self.enter();
        let delivered = self.agent.pump(self);
        self.probe.record(EngineOp::Pump(delivered));
        Ok(delivered)
    }

    fn set_debug_message_handler(&self, handler: Option<MessageHandler>) {
        let _entry = self.enter();
        self.probe.record(EngineOp::SetHandler(handler.is_some()));
        self.agent.set_handler(handler);
    }

    fn register_native(&self, name: &str, function: NativeFunction) -> Result<(), EngineError> {
        let _entry = self.enter();
        self.natives.lock().insert(name.to_string(), function);
        Ok(())
    }
}
