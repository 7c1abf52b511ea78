//! Logging bootstrap.
//!
//! Logs go to stderr unless a directory is configured, in which case they go
//! to size-rotated files there and warnings are still echoed to stderr.
//! Initialization happens at most once per process and never panics.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;

const LOG_FILE_BASENAME: &str = "jarvis";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: Option<PathBuf>,
    _logger: LoggerHandle,
}

/// Starts the global logger.
///
/// # Details
/// Repeating the call with the same settings is a no-op; asking for a
/// different level or destination afterwards is an error.
///
/// # Errors
/// Unknown level names, an uncreatable directory or a backend failure.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<()> {
    let level = normalize_level(level)?;
    let log_dir = log_dir.map(Path::to_path_buf);

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, log_dir.clone()))?;
    if state.level != level || state.log_dir != log_dir {
        bail!(
            "logging already initialized with level `{}`; refusing to reconfigure",
            state.level
        );
    }
    Ok(())
}

fn start_logger(level: &'static str, log_dir: Option<PathBuf>) -> Result<LoggingState> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| anyhow!("invalid log level `{level}`: {err}"))?;
    let logger = match &log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            logger
                .log_to_file(FileSpec::default().directory(dir).basename(LOG_FILE_BASENAME))
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .duplicate_to_stderr(Duplicate::Warn)
                .format_for_files(flexi_logger::detailed_format)
        }
        None => logger.log_to_stderr(),
    };
    let handle = logger
        .start()
        .map_err(|err| anyhow!("failed to start logger: {err}"))?;

    info!(
        "event=app_start platform={} version={} level={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        level
    );
    Ok(LoggingState {
        level,
        log_dir,
        _logger: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" => Ok("off"),
        other => bail!("unsupported log level `{other}`; expected trace|debug|info|warn|error|off"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level(" INFO ").unwrap(), "info");
        assert_eq!(normalize_level("warning").unwrap(), "warn");
        assert!(normalize_level("loud").is_err());
    }

    #[test]
    fn init_is_idempotent_and_rejects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        init_logging("debug", Some(&logs)).unwrap();
        init_logging("debug", Some(&logs)).unwrap();
        assert!(logs.is_dir());
        assert!(init_logging("error", Some(&logs)).is_err());
        assert!(init_logging("debug", None).is_err());
    }
}
