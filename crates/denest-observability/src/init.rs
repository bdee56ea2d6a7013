// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with the `file-logging` feature, a timestamped run
//! folder of JSON logs as well:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       ├── denest-network.log
//!       ├── denest-simulation.log
//!       └── denest.log (combined)
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

const RUN_FOLDER_PREFIX: &str = "run_";
const RUN_FOLDER_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where and how long to keep log files
#[derive(Debug, Clone)]
pub struct FileLogging {
    pub log_dir: PathBuf,
    pub retention_days: u32,
}

/// Keeps file writers alive; logs are flushed when dropped
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Install the global subscriber
///
/// # Arguments
/// * `debug_flags` - Crates raised to `debug`
/// * `default_level` - Level for everything else
/// * `file` - File logging settings; ignored without the `file-logging` feature
///
/// # Errors
/// Fails if the log folder can't be created or a subscriber is already installed.
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    default_level: &str,
    file: Option<&FileLogging>,
) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(default_level);
    let env_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;

    let mut layers = Vec::new();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let guard = match file {
        Some(settings) => file_layers(settings, &env_filter, &mut layers)?,
        None => LoggingGuard {
            #[cfg(feature = "file-logging")]
            _file_guards: Vec::new(),
            log_dir: None,
        },
    };

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[cfg(feature = "file-logging")]
fn file_layers(
    settings: &FileLogging,
    env_filter: &EnvFilter,
    layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let timestamp = Utc::now().format(RUN_FOLDER_FORMAT);
    let run_folder = settings
        .log_dir
        .join(format!("{}{}", RUN_FOLDER_PREFIX, timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_logs(&settings.log_dir, settings.retention_days)?;

    let mut file_guards = Vec::new();
    for crate_name in crate::KNOWN_CRATES {
        let file_appender = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guards.push(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::new(format!("off,{}=debug", crate_name)))
            .boxed();
        layers.push(file_layer);
    }

    let combined_appender = rolling::never(&run_folder, "denest.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined_appender);
    file_guards.push(combined_guard);
    let combined_layer = tracing_subscriber::fmt::layer()
        .with_writer(combined_non_blocking)
        .with_target(true)
        .json()
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(combined_layer);

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
fn file_layers(
    settings: &FileLogging,
    _env_filter: &EnvFilter,
    _layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    eprintln!(
        "Warning: file logging to {} requested but denest was built without the `file-logging` feature",
        settings.log_dir.display()
    );
    Ok(LoggingGuard { log_dir: None })
}

/// Remove run folders older than `retention_days`
///
/// Returns the number of folders removed. Entries whose name doesn't parse as
/// a run folder are left alone.
pub fn cleanup_old_logs(base_log_dir: &Path, retention_days: u32) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));

    let mut removed = 0;
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let created = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_FOLDER_PREFIX))
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, RUN_FOLDER_FORMAT).ok())
            .map(|naive| Utc.from_utc_datetime(&naive));
        if let Some(created) = created {
            if created < cutoff {
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => eprintln!(
                        "Warning: Failed to remove old log directory {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_removes_only_expired_runs() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("run_20000101_000000");
        let recent = dir
            .path()
            .join(format!("run_{}", Utc::now().format(RUN_FOLDER_FORMAT)));
        let unrelated = dir.path().join("keep_me");
        for path in [&old, &recent, &unrelated] {
            std::fs::create_dir_all(path).unwrap();
        }

        let removed = cleanup_old_logs(dir.path(), 7).unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent"), 7).unwrap(), 0);
    }
}
