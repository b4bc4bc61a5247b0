//! Logging setup for the `narrate` binary.
//!
//! Logs go to stderr by default so stdout carries only the answer. With a log
//! file they go to `~/.local/state/db-narrate/narrate.log` (or the platform
//! equivalent) instead.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, truncating it first.
///
/// Falls back to stderr logging when the file cannot be created.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Default log file location.
///
/// Uses the XDG state directory on Linux, the config directory elsewhere,
/// and the temp directory as a last resort.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("db-narrate").join("narrate.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("db-narrate").join("narrate.log");
    }

    std::env::temp_dir().join("narrate.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_absolute() {
        assert!(default_log_path().is_absolute());
    }

    #[test]
    fn test_log_path_ends_with_narrate_log() {
        assert!(default_log_path().ends_with("narrate.log"));
    }
}
