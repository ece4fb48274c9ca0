//! Process logging.
//!
//! stdout carries the IPC protocol, so log lines go to stderr, or to
//! rotating files when a directory is configured. Messages are
//! metadata-only `event=... module=...` pairs.

use anyhow::{anyhow, Context};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use std::path::Path;

const LOG_FILE_BASENAME: &str = "lernovad";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

/// Starts the logger once per process; later calls are no-ops.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    LOGGER.get_or_try_init(|| -> anyhow::Result<LoggerHandle> {
        let logger = Logger::try_with_str(level)
            .map_err(|e| anyhow!("invalid log level `{}`: {}", level, e))?;
        let logger = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {}", dir.display()))?;
                logger
                    .log_to_file(
                        FileSpec::default()
                            .directory(dir)
                            .basename(LOG_FILE_BASENAME),
                    )
                    .rotate(
                        Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                        Naming::Numbers,
                        Cleanup::KeepLogFiles(MAX_LOG_FILES),
                    )
                    .write_mode(WriteMode::BufferAndFlush)
                    .append()
                    .format_for_files(flexi_logger::detailed_format)
            }
            None => logger
                .log_to_stderr()
                .format_for_stderr(flexi_logger::detailed_format),
        };
        let handle = logger.start().context("failed to start logger")?;
        info!(
            "event=app_start module=core status=ok platform={} version={}",
            std::env::consts::OS,
            env!("CARGO_PKG_VERSION")
        );
        Ok(handle)
    })?;
    Ok(())
}

/// Initializes from `LERNOVA_LOG_LEVEL` / `LERNOVA_LOG_DIR`.
pub fn init_from_env() -> anyhow::Result<()> {
    let level = std::env::var("LERNOVA_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    let dir = std::env::var_os("LERNOVA_LOG_DIR").map(std::path::PathBuf::from);
    init_logging(&level, dir.as_deref())
}
