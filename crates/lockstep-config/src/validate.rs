use crate::config::Config;
use crate::error::ConfigError;

/// Largest accepted breakpoint line or column offset.
pub const MAX_BREAKPOINT_OFFSET: i64 = 1_000_000;

fn violation(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let session = &config.session;

    if session.client.is_empty() {
        errors.push(violation("session.client", "must not be empty".into()));
    }
    if session.handler_function.is_empty() {
        errors.push(violation(
            "session.handler_function",
            "must not be empty".into(),
        ));
    }

    // command_timeout_ms: 1–60000
    if !(1..=60_000).contains(&session.command_timeout_ms) {
        errors.push(violation(
            "session.command_timeout_ms",
            format!("must be 1-60000, got {}", session.command_timeout_ms),
        ));
    }
    if session.readiness_timeout_ms == 0 {
        errors.push(violation(
            "session.readiness_timeout_ms",
            "must be at least 1".into(),
        ));
    }

    // command_buffer_units: 16–65536
    if !(16..=65_536).contains(&session.command_buffer_units) {
        errors.push(violation(
            "session.command_buffer_units",
            format!("must be 16-65536, got {}", session.command_buffer_units),
        ));
    }

    if config.breakpoint.target.is_empty() {
        errors.push(violation("breakpoint.target", "must not be empty".into()));
    }
    // breakpoint line/column: 0–MAX_BREAKPOINT_OFFSET
    let offsets = 0..=MAX_BREAKPOINT_OFFSET;
    if !offsets.contains(&config.breakpoint.line) || !offsets.contains(&config.breakpoint.column) {
        errors.push(violation(
            "breakpoint",
            format!(
                "line and column must be 0-{MAX_BREAKPOINT_OFFSET}, got {}:{}",
                config.breakpoint.line, config.breakpoint.column
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_error_field(cfg: &Config) -> String {
        let errs = validate(cfg).unwrap_err();
        assert_eq!(errs.len(), 1, "{errs:?}");
        match &errs[0] {
            ConfigError::Validation { field, .. } => field.clone(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn empty_client_rejected() {
        let mut cfg = Config::default();
        cfg.session.client.clear();
        assert_eq!(single_error_field(&cfg), "session.client");
    }

    #[test]
    fn timeout_bounds() {
        let mut cfg = Config::default();
        cfg.session.command_timeout_ms = 0;
        assert_eq!(single_error_field(&cfg), "session.command_timeout_ms");
        cfg.session.command_timeout_ms = 60_001;
        assert_eq!(single_error_field(&cfg), "session.command_timeout_ms");
        cfg.session.command_timeout_ms = 60_000;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn buffer_units_bounds() {
        let mut cfg = Config::default();
        cfg.session.command_buffer_units = 15;
        assert_eq!(single_error_field(&cfg), "session.command_buffer_units");
        cfg.session.command_buffer_units = 16;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn negative_breakpoint_line_rejected() {
        let mut cfg = Config::default();
        cfg.breakpoint.line = -1;
        assert_eq!(single_error_field(&cfg), "breakpoint");
    }

    #[test]
    fn huge_breakpoint_offset_rejected() {
        let mut cfg = Config::default();
        cfg.breakpoint.line = i64::MAX;
        assert_eq!(single_error_field(&cfg), "breakpoint");
        cfg.breakpoint.line = MAX_BREAKPOINT_OFFSET;
        assert!(validate(&cfg).is_ok());
        cfg.breakpoint.column = MAX_BREAKPOINT_OFFSET + 1;
        assert_eq!(single_error_field(&cfg), "breakpoint");
    }

    #[test]
    fn zero_max_requests_allowed() {
        let mut cfg = Config::default();
        cfg.session.max_requests = 0;
        cfg.session.request_interval_ms = 0;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn multiple_errors_returned() {
        let mut cfg = Config::default();
        cfg.session.client.clear();
        cfg.session.readiness_timeout_ms = 0;
        cfg.breakpoint.target.clear();
        assert_eq!(validate(&cfg).unwrap_err().len(), 3);
    }
}
