//! Log file helpers.
//!
//! The `tracing-subscriber` setup lives in the binary; this module only
//! prepares the file it writes to and builds the default filter.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::LogConfig;

/// Rotate a log file once it grows past this size (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the active one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Filter directive used when `RUST_LOG` is unset.
///
/// The configured level applies to the lockstep crates; everything else
/// stays at `warn`.
pub fn default_filter(config: &LogConfig) -> String {
    let level = config.level.as_filter();
    format!(
        "warn,lockstep={level},lockstep_protocol={level},lockstep_engine={level},lockstep_session={level},lockstep_config={level}"
    )
}

/// Create the log file's parent directory and rotate the file if it is
/// too large. Returns the path to open.
pub fn prepare_log_file(path: &Path) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    rotate_log_files(path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    Ok(path.to_path_buf())
}

/// Shift `lockstep.log` to `lockstep.log.1`, `.1` to `.2` and so on once
/// the active file reaches `max_size` bytes. The oldest file is deleted.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let Ok(metadata) = fs::metadata(log_path) else {
        return Ok(());
    };
    if metadata.len() < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn default_filter_uses_configured_level() {
        let config = LogConfig {
            level: LogLevel::Debug,
            file: None,
        };
        let filter = default_filter(&config);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("lockstep_session=debug"));
        assert!(filter.contains("lockstep=debug"));
    }

    #[test]
    fn rotated_path_appends_index() {
        let base = Path::new("/tmp/lockstep.log");
        assert_eq!(rotated_path(base, 2), PathBuf::from("/tmp/lockstep.log.2"));
    }

    #[test]
    fn prepare_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("nested").join("lockstep.log");
        let prepared = prepare_log_file(&path).unwrap();
        assert_eq!(prepared, path);
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn rotate_skips_small_or_missing_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lockstep.log");
        rotate_log_files(&path, 10, 3).unwrap();

        fs::write(&path, "tiny").unwrap();
        rotate_log_files(&path, 10, 3).unwrap();
        assert!(path.exists());
        assert!(!rotated_path(&path, 1).exists());
    }

    #[test]
    fn rotate_shifts_and_drops_oldest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lockstep.log");
        fs::write(&path, "current contents").unwrap();
        fs::write(rotated_path(&path, 1), "one").unwrap();
        fs::write(rotated_path(&path, 2), "two").unwrap();

        rotate_log_files(&path, 4, 2).unwrap();

        assert!(!path.exists());
        assert_eq!(fs::read_to_string(rotated_path(&path, 1)).unwrap(), "current contents");
        assert_eq!(fs::read_to_string(rotated_path(&path, 2)).unwrap(), "one");
        assert!(!rotated_path(&path, 3).exists());
    }
}
