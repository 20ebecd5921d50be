use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "nic_checker";
const LOG_FILE_SUFFIX: &str = "log";

/// Installs the global subscriber: stdout always, plus a daily rolling file
/// when enabled. The returned guard flushes the file writer on drop and must
/// live as long as the program.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard, pruned) = if config.enabled {
        let pruned = prune_old_logs(&config.dir, retention(config))?;
        let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard), pruned)
    } else {
        (None, None, 0)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if pruned > 0 {
        tracing::info!(
            "Removed {} log files older than {} days from {}",
            pruned,
            config.retention_days,
            config.dir.display()
        );
    }
    Ok(guard)
}

fn retention(config: &LoggingConfig) -> Duration {
    Duration::from_secs(config.retention_days * 24 * 60 * 60)
}

fn file_appender(config: &LoggingConfig) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.retention_days as usize)
        .build(&config.dir)
        .with_context(|| format!("Failed to open log directory {}", config.dir.display()))
}

/// Deletes our log files last modified more than `max_age` ago. Runs before
/// the subscriber exists, so it reports a count instead of logging.
fn prune_old_logs(dir: &Path, max_age: Duration) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)?.flatten() {
        let is_ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !is_ours || !metadata.is_file() {
            continue;
        }

        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);
        if expired && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}
