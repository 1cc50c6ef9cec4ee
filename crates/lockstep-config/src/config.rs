use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level. `RUST_LOG` overrides it.
    #[serde(default)]
    pub level: LogLevel,
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Session timing and request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client name placed in every request document.
    #[serde(default = "default_client")]
    pub client: String,
    /// Global function the request driver calls.
    #[serde(default = "default_handler_function")]
    pub handler_function: String,
    /// Bound on each debugger command, in milliseconds (1–60000).
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Bound on the driver's first request, in milliseconds.
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    /// Pause between driver requests, in milliseconds.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Stop the driver after this many requests; 0 means no limit.
    #[serde(default)]
    pub max_requests: u64,
    /// Command transport buffer capacity in UTF-16 units (16–65536).
    #[serde(default = "default_command_buffer_units")]
    pub command_buffer_units: usize,
}

fn default_client() -> String {
    "Chrome Canary".to_string()
}
fn default_handler_function() -> String {
    "DebugUserRequest".to_string()
}
fn default_command_timeout_ms() -> u64 {
    2000
}
fn default_readiness_timeout_ms() -> u64 {
    5000
}
fn default_request_interval_ms() -> u64 {
    1
}
fn default_command_buffer_units() -> usize {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client: default_client(),
            handler_function: default_handler_function(),
            command_timeout_ms: default_command_timeout_ms(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            request_interval_ms: default_request_interval_ms(),
            max_requests: 0,
            command_buffer_units: default_command_buffer_units(),
        }
    }
}

/// The breakpoint placed by the control sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointConfig {
    /// Function to break in.
    #[serde(default = "default_handler_function")]
    pub target: String,
    /// Line offset from the function header.
    #[serde(default = "default_breakpoint_line")]
    pub line: i64,
    /// Column offset.
    #[serde(default)]
    pub column: i64,
}

fn default_breakpoint_line() -> i64 {
    1
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            target: default_handler_function(),
            line: default_breakpoint_line(),
            column: 0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Control-sequence breakpoint.
    #[serde(default)]
    pub breakpoint: BreakpointConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_values() {
        let cfg = Config::default();
        assert_eq!(cfg.session.client, "Chrome Canary");
        assert_eq!(cfg.session.handler_function, "DebugUserRequest");
        assert_eq!(cfg.session.command_timeout_ms, 2000);
        assert_eq!(cfg.session.max_requests, 0);
        assert_eq!(cfg.session.command_buffer_units, 1000);
    }

    #[test]
    fn default_breakpoint_targets_handler() {
        let cfg = Config::default();
        assert_eq!(cfg.breakpoint.target, cfg.session.handler_function);
        assert_eq!((cfg.breakpoint.line, cfg.breakpoint.column), (1, 0));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str("[session]\nclient = \"Firefox\"\n").unwrap();
        assert_eq!(cfg.session.client, "Firefox");
        assert_eq!(cfg.session.readiness_timeout_ms, 5000);
    }

    #[test]
    fn log_level_parses_snake_case() {
        let cfg: Config = toml::from_str("[log]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(cfg.log.level, LogLevel::Debug);
        assert_eq!(cfg.log.level.as_filter(), "debug");
    }

    #[test]
    fn unknown_log_level_rejected() {
        assert!(toml::from_str::<Config>("[log]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn config_serializes_round_trip() {
        let mut cfg = Config::default();
        cfg.log.file = Some(PathBuf::from("/tmp/lockstep.log"));
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
