// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers winning:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, DenestConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for
pub const CONFIG_FILE_NAME: &str = "denest.toml";

/// Environment variable pointing at a configuration file
pub const CONFIG_PATH_ENV: &str = "DENEST_CONFIG_PATH";

/// Find the denest configuration file
///
/// Search order:
/// 1. `DENEST_CONFIG_PATH` environment variable
/// 2. Current working directory: `./denest.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<DenestConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    let content = fs::read_to_string(&config_file)?;
    let config: DenestConfig = toml::from_str(&content)?;
    finish(config, cli_args)
}

/// Like [`load_config`], but a missing file (when none was named
/// explicitly) yields the defaults with overrides applied
pub fn load_config_or_default(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<DenestConfig> {
    if config_path.is_some() {
        return load_config(config_path, cli_args);
    }
    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) if env::var(CONFIG_PATH_ENV).is_err() => {
            finish(DenestConfig::default(), cli_args)
        }
        Err(e) => Err(e),
    }
}

fn finish(mut config: DenestConfig, cli_args: Option<&HashMap<String, String>>) -> ConfigResult<DenestConfig> {
    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }
    validate_config(&config)?;
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `DENEST_OUTPUT_DIR` -> `paths.output_dir`
/// - `DENEST_INPUT_DIR` -> `paths.input_dir`
/// - `DENEST_CURRENT_LINK` -> `output.current_link`
/// - `DENEST_CLEAR_OUTPUT_DIR` -> `output.clear_output_dir`
/// - `DENEST_LOG_LEVEL` -> `logging.level`
/// - `DENEST_LOG_DIR` -> `logging.log_dir`
/// - `DENEST_FILE_LOGGING` -> `logging.file_logging`
pub fn apply_environment_overrides(config: &mut DenestConfig) {
    if let Ok(value) = env::var("DENEST_OUTPUT_DIR") {
        config.paths.output_dir = Some(PathBuf::from(value));
    }
    if let Ok(value) = env::var("DENEST_INPUT_DIR") {
        config.paths.input_dir = Some(PathBuf::from(value));
    }
    if let Ok(value) = env::var("DENEST_CURRENT_LINK") {
        config.output.current_link = value;
    }
    if let Ok(value) = env::var("DENEST_CLEAR_OUTPUT_DIR") {
        config.output.clear_output_dir = Some(parse_flag(&value));
    }
    if let Ok(value) = env::var("DENEST_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("DENEST_LOG_DIR") {
        config.logging.log_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("DENEST_FILE_LOGGING") {
        config.logging.file_logging = parse_flag(&value);
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"output_dir": "runs/a", "log_level": "debug"}`)
pub fn apply_cli_overrides(config: &mut DenestConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("output_dir") {
        config.paths.output_dir = Some(PathBuf::from(value));
    }
    if let Some(value) = cli_args.get("input_dir") {
        config.paths.input_dir = Some(PathBuf::from(value));
    }
    if let Some(value) = cli_args.get("current_link") {
        config.output.current_link = value.clone();
    }
    if let Some(value) = cli_args.get("clear_output_dir") {
        config.output.clear_output_dir = Some(parse_flag(value));
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("file_logging") {
        config.logging.file_logging = parse_flag(value);
    }
}
