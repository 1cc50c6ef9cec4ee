//! Embedded Lua engine.
//!
//! Wraps one `mlua::Lua` state. A line hook reports executed lines to the
//! debug agent so function breakpoints fire while interpreted code runs.

use std::sync::Arc;

use mlua::{Function, HookTriggers, Lua, LuaSerdeExt, MultiValue, RegistryKey, VmState};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use crate::agent::{DebugAgent, FunctionLocator};
use crate::engine::{HandlerFunction, MessageHandler, NativeFunction, ScriptEngine};
use crate::error::EngineError;

/// A Lua 5.4 interpreter behind the [`ScriptEngine`] surface.
pub struct LuaEngine {
    lua: Lua,
    agent: Arc<DebugAgent>,
    functions: Mutex<Vec<RegistryKey>>,
    sources: Mutex<Vec<(String, String)>>,
}

fn from_lua_error(err: mlua::Error) -> EngineError {
    match err {
        mlua::Error::SyntaxError { message, .. } => EngineError::Compile(message),
        other => EngineError::Runtime(other.to_string()),
    }
}

/// Strip Lua's `@`/`=` chunk-name markers.
fn chunk_name(source: &str) -> &str {
    source.trim_start_matches(['@', '='])
}

impl LuaEngine {
    /// Create a fresh interpreter with the line hook installed.
    pub fn new() -> Self {
        let lua = Lua::new();
        let agent = Arc::new(DebugAgent::new());

        let hook_agent = Arc::clone(&agent);
        lua.set_hook(HookTriggers::EVERY_LINE, move |_lua, debug| {
            if hook_agent.is_armed() {
                let source = debug.source();
                let chunk = chunk_name(source.source.as_deref().unwrap_or_default());
                hook_agent.hit_line(chunk, i64::from(debug.curr_line()) - 1);
            }
            Ok(VmState::Continue)
        });

        Self {
            lua,
            agent,
            functions: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// The engine's debug agent.
    pub fn agent(&self) -> &DebugAgent {
        &self.agent
    }

    /// Chunk name and 1-based header line of the newest definition of `name`.
    fn locate_in_sources(&self, name: &str) -> Option<(String, i64)> {
        let escaped = regex::escape(name);
        let patterns = [
            format!(r"^\s*(?:local\s+)?function\s+{escaped}\s*\("),
            format!(r"{escaped}\s*=\s*function\s*\("),
        ];
        let regexes: Vec<Regex> = patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        let sources = self.sources.lock();
        sources.iter().rev().find_map(|(chunk, source)| {
            source.lines().enumerate().find_map(|(idx, line)| {
                regexes
                    .iter()
                    .any(|re| re.is_match(line))
                    .then(|| (chunk.clone(), idx as i64 + 1))
            })
        })
    }
}

impl Default for LuaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionLocator for LuaEngine {
    fn function_line(&self, name: &str) -> Result<i64, String> {
        let value: mlua::Value = self
            .lua
            .globals()
            .get(name)
            .map_err(|e| e.to_string())?;
        match value {
            mlua::Value::Function(_) => {}
            mlua::Value::Nil => return Err(format!("Unknown function {name}")),
            _ => return Err(format!("{name} is not a function")),
        }
        self.locate_in_sources(name)
            .map(|(_, line)| line)
            .ok_or_else(|| format!("Cannot locate the definition of {name}"))
    }

    fn function_script(&self, name: &str) -> Option<String> {
        self.locate_in_sources(name).map(|(chunk, _)| chunk)
    }
}

impl ScriptEngine for LuaEngine {
    fn compile_and_run(&self, name: &str, source: &str) -> Result<(), EngineError> {
        self.lua
            .load(source)
            .set_name(name)
            .exec()
            .map_err(from_lua_error)?;
        self.sources
            .lock()
            .push((name.to_string(), source.to_string()));
        tracing::debug!(program = name, "program loaded");
        Ok(())
    }

    fn resolve_global_function(&self, name: &str) -> Result<HandlerFunction, EngineError> {
        let value: mlua::Value = self.lua.globals().get(name).map_err(from_lua_error)?;
        let function = match value {
            mlua::Value::Function(f) => f,
            mlua::Value::Nil => return Err(EngineError::NotFound(name.to_string())),
            other => {
                return Err(EngineError::NotCallable {
                    name: name.to_string(),
                    kind: other.type_name().to_string(),
                })
            }
        };
        let key = self
            .lua
            .create_registry_value(function)
            .map_err(from_lua_error)?;
        let mut functions = self.functions.lock();
        functions.push(key);
        Ok(HandlerFunction::new(name, functions.len() - 1))
    }

    fn call_function(&self, function: &HandlerFunction, arg: &Value) -> Result<Value, EngineError> {
        let callee: Function = {
            let functions = self.functions.lock();
            let key = functions
                .get(function.slot())
                .ok_or_else(|| EngineError::NotFound(function.name().to_string()))?;
            self.lua.registry_value(key).map_err(from_lua_error)?
        };
        let arg = self
            .lua
            .to_value(arg)
            .map_err(|e| EngineError::Conversion(e.to_string()))?;
        let result: mlua::Value = callee.call(arg).map_err(from_lua_error)?;
        self.lua
            .from_value(result)
            .map_err(|e| EngineError::Conversion(e.to_string()))
    }

    fn send_debug_command(&self, units: &[u16]) -> Result<(), EngineError> {
        self.agent.queue_command(units)
    }

    fn pump_debug_messages(&self) -> Result<usize, EngineError> {
        Ok(self.agent.pump(self))
    }

    fn set_debug_message_handler(&self, handler: Option<MessageHandler>) {
        self.agent.set_handler(handler);
    }

    fn register_native(&self, name: &str, function: NativeFunction) -> Result<(), EngineError> {
        let native = self
            .lua
            .create_function(move |lua, args: MultiValue| {
                let values: Vec<Value> = args
                    .into_iter()
                    .map(|v| lua.from_value(v).unwrap_or(Value::Null))
                    .collect();
                function(&values);
                Ok(())
            })
            .map_err(from_lua_error)?;
        self.lua
            .globals()
            .set(name, native)
            .map_err(from_lua_error)
    }
}
