// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! All problems are collected and reported together.

use crate::{ConfigError, ConfigResult, DenestConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidValue { field: String, reason: String },
    PathConflict { first: String, second: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::PathConflict { first, second } => {
                write!(f, "{} and {} point at the same directory", first, second)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &DenestConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_paths(config, &mut errors);
    validate_output(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }
    Ok(())
}

fn validate_paths(config: &DenestConfig, errors: &mut Vec<ConfigValidationError>) {
    if let (Some(output), Some(input)) = (&config.paths.output_dir, &config.paths.input_dir) {
        if output == input {
            errors.push(ConfigValidationError::PathConflict {
                first: "paths.output_dir".to_string(),
                second: "paths.input_dir".to_string(),
            });
        }
    }
    for (field, path) in [
        ("paths.output_dir", &config.paths.output_dir),
        ("paths.input_dir", &config.paths.input_dir),
    ] {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
    }
}

fn validate_output(config: &DenestConfig, errors: &mut Vec<ConfigValidationError>) {
    let link = &config.output.current_link;
    if link.is_empty() || link.contains('/') || link.contains('\\') || link == "." || link == ".." {
        errors.push(ConfigValidationError::InvalidValue {
            field: "output.current_link".to_string(),
            reason: format!("must be a plain file name, got '{}'", link),
        });
    }
}

fn validate_logging(config: &DenestConfig, errors: &mut Vec<ConfigValidationError>) {
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("expected one of {:?}, got '{}'", LOG_LEVELS, config.logging.level),
        });
    }
    if config.logging.file_logging && config.logging.retention_days == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.retention_days".to_string(),
            reason: "must be at least 1 when file logging is enabled".to_string(),
        });
    }
}
