use log::{error, info, LevelFilter};
use std::path::{Path, PathBuf};

use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::LogLevel;
use crate::error::{Error, Result};

pub const LOG_ENV_VAR: &str = "CURATOR_LOG";
const LOG_FILE: &str = "curator.log";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const ARCHIVED_FILES: u32 = 5;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}";

/// Install a rolling-file logger writing to `log_dir/curator.log`.
///
/// Output goes to the file only so progress bars stay readable. The
/// `CURATOR_LOG` environment variable overrides `level`. Returns the log
/// file path.
pub fn init_logger(log_dir: &Path, level: LogLevel) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let log_file = log_dir.join(LOG_FILE);
    let archive_pattern = log_dir.join("curator.{}.log");

    let roller = FixedWindowRoller::builder()
        .build(&archive_pattern.to_string_lossy(), ARCHIVED_FILES)
        .map_err(|e| Error::Configuration(format!("Failed to create log roller: {}", e)))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));

    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(&log_file, Box::new(policy))
        .map_err(|e| Error::Configuration(format!("Failed to create log appender: {}", e)))?;

    let level = level_from_env().unwrap_or_else(|| level.into());
    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|e| Error::Configuration(format!("Failed to build log config: {}", e)))?;

    log4rs::init_config(config)
        .map_err(|e| Error::Configuration(format!("Failed to initialize log4rs: {}", e)))?;

    info!("Image curator started, logging to {}", log_file.display());
    Ok(log_file)
}

/// Level named by `CURATOR_LOG`, if set and valid
pub fn level_from_env() -> Option<LevelFilter> {
    std::env::var(LOG_ENV_VAR).ok()?.parse().ok()
}

pub fn log_file_error(path: &Path, operation: &str, error: &dyn std::error::Error) {
    error!(
        "File operation failed - Operation: {}, Path: {}, Error: {}",
        operation,
        path.display(),
        error
    );
}

pub fn log_hash_error(path: &Path, error: &dyn std::error::Error) {
    error!(
        "Hash computation failed - Path: {}, Error: {}",
        path.display(),
        error
    );
}

/// Every change the removal engine makes to the filesystem goes through here
pub fn log_fs_modification(operation: &str, path: &Path, details: Option<&str>) {
    match details {
        Some(details) if !details.is_empty() => info!(
            "FS CHANGE - Operation: {}, Path: {}, Details: {}",
            operation,
            path.display(),
            details
        ),
        _ => info!("FS CHANGE - Operation: {}, Path: {}", operation, path.display()),
    }
}
