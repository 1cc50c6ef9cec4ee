use lockstep_config::{load_config, load_from_str, ConfigError, LogLevel, CONFIG_FILE_NAME};
use tempfile::TempDir;

#[test]
fn config_file_is_found_from_a_nested_directory() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join(CONFIG_FILE_NAME),
        "[session]\nclient = \"Firefox\"\nmax_requests = 10\n\n[log]\nlevel = \"debug\"\n",
    )
    .unwrap();
    let nested = tmp.path().join("scripts");
    std::fs::create_dir_all(&nested).unwrap();

    let config = load_config(None, Some(&nested)).unwrap();
    assert_eq!(config.session.client, "Firefox");
    assert_eq!(config.session.max_requests, 10);
    assert_eq!(config.log.level, LogLevel::Debug);
    assert_eq!(config.breakpoint.target, "DebugUserRequest");
}

#[test]
fn config_rejects_unusable_buffer() {
    let err = load_from_str("[session]\ncommand_buffer_units = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
}

#[test]
fn config_breakpoint_override() {
    let config = load_from_str("[breakpoint]\ntarget = \"helper\"\nline = 3\n").unwrap();
    assert_eq!(config.breakpoint.target, "helper");
    assert_eq!((config.breakpoint.line, config.breakpoint.column), (3, 0));
}
