use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "LOCKSTEP_CONFIG";

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "lockstep.toml";

/// The config path from [`CONFIG_ENV_VAR`], if set and non-empty.
pub fn explicit_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load and merge configuration.
///
/// 1. Start from `Config::default()`.
/// 2. If `explicit` is given, merge that file; it must exist.
/// 3. Otherwise, if `search_from` is given, merge the nearest
///    `lockstep.toml` found walking upward from it.
/// 4. Validate the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(explicit: Option<&Path>, search_from: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => search_from.and_then(find_config_file),
    };

    let mut config = Config::default();
    if let Some(path) = path {
        let content = std::fs::read_to_string(&path)?;
        config = merge_configs(&config, &content)?;
        tracing::debug!("loaded config from {}", path.display());
    }

    first_violation(&config)?;
    Ok(config)
}

/// Walk from `start` upward looking for `lockstep.toml`.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_violation(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_config_defaults_without_sources() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "[session]\nclient = \"Firefox\"\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.session.client, "Firefox");
        // Unmodified fields keep defaults
        assert_eq!(config.session.command_timeout_ms, 2000);
    }

    #[test]
    fn load_config_missing_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(&path), None),
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn load_config_explicit_wins_over_search() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "[breakpoint]\nline = 7\n").unwrap();
        let explicit = tmp.path().join("other.toml");
        std::fs::write(&explicit, "[breakpoint]\nline = 2\n").unwrap();

        let config = load_config(Some(&explicit), Some(tmp.path())).unwrap();
        assert_eq!(config.breakpoint.line, 2);
    }

    #[test]
    fn load_config_validates_file_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[session]\ncommand_buffer_units = 4\n").unwrap();
        match load_config(Some(&path), None) {
            Err(ConfigError::Validation { field, .. }) => {
                assert_eq!(field, "session.command_buffer_units")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn find_config_file_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join(CONFIG_FILE_NAME), "[log]\nlevel = \"warn\"\n").unwrap();

        let deep = root.join("scripts").join("demo");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_config_file(&deep).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE_NAME));

        let config = load_config(None, Some(&deep)).unwrap();
        assert_eq!(config.log.level, crate::LogLevel::Warn);
    }

    #[test]
    fn load_from_str_parses_valid_toml() {
        let config = load_from_str("[session]\nmax_requests = 10\n").unwrap();
        assert_eq!(config.session.max_requests, 10);
    }

    #[test]
    fn load_from_str_rejects_invalid_toml() {
        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_from_str_rejects_invalid_values() {
        let result = load_from_str("[session]\ncommand_timeout_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
