use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Values present in `overlay_toml` override those in `base`.
/// Missing keys in the overlay keep their `base` values.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let base_str = toml::to_string(base).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut base_val: toml::Value =
        toml::from_str(&base_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let overlay_val: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut base_val, &overlay_val);

    base_val
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

/// Tables merge key by key; everything else is replaced.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => merge_values(base_val, val),
                    None => {
                        base_table.insert(key.clone(), val.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        let merged = merge_configs(&base, "").expect("merge empty");
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_overrides_timeout_only() {
        let base = Config::default();
        let merged = merge_configs(&base, "[session]\ncommand_timeout_ms = 250\n").expect("merge");
        assert_eq!(merged.session.command_timeout_ms, 250);
        assert_eq!(merged.session.client, base.session.client);
        assert_eq!(merged.breakpoint, base.breakpoint);
    }

    #[test]
    fn merge_adds_log_file() {
        let base = Config::default();
        assert!(base.log.file.is_none());
        let merged = merge_configs(&base, "[log]\nfile = \"/tmp/l.log\"\n").expect("merge");
        assert_eq!(
            merged.log.file.as_deref(),
            Some(std::path::Path::new("/tmp/l.log"))
        );
        assert_eq!(merged.log.level, base.log.level);
    }

    #[test]
    fn merge_layers_apply_in_order() {
        let first = merge_configs(&Config::default(), "[breakpoint]\nline = 3\n").unwrap();
        let second = merge_configs(&first, "[breakpoint]\ncolumn = 2\n").unwrap();
        assert_eq!((second.breakpoint.line, second.breakpoint.column), (3, 2));
    }

    #[test]
    fn merge_invalid_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_wrong_type_returns_parse_error() {
        let result = merge_configs(&Config::default(), "[session]\nmax_requests = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
