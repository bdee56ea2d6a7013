// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `denest.toml`. Every section and field is
//! optional in the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DenestConfig {
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Input and output locations
///
/// When set, these take precedence over `simulation.params.output_dir` and
/// `simulation.params.input_dir` of the parameter tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
}

/// Output directory handling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Name of the pointer to the latest run, created next to the run directory
    pub current_link: String,
    /// Overrides `simulation.params.clear_output_dir` when set
    pub clear_output_dir: Option<bool>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            current_link: "current".to_string(),
            clear_output_dir: None,
        }
    }
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for crates without a debug flag
    pub level: String,
    /// Write per-crate JSON log files
    pub file_logging: bool,
    pub log_dir: PathBuf,
    /// Log files older than this are removed at startup
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: PathBuf::from("logs"),
            retention_days: 7,
        }
    }
}
