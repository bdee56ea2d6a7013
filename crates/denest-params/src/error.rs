// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Configuration error types.

Every variant names the node or object that caused it, and the offending key
when there is one, so a bad tree can be fixed without looking at kernel state.
*/

use std::path::PathBuf;
use thiserror::Error;

/// Result type for parameter operations
pub type ParamsResult<T> = Result<T, ConfigurationError>;

/// Errors raised while loading, merging or validating parameters
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing mandatory parameter `{key}` for `{object}`")]
    MissingParameter { object: String, key: String },

    #[error("Unrecognized parameter `{key}` for `{object}`")]
    UnrecognizedParameter { object: String, key: String },

    #[error("Reserved parameter `{key}` may not be set for `{object}`")]
    ReservedParameter { object: String, key: String },

    #[error("Parameter `{key}` of `{object}` has the wrong type: expected {expected}")]
    InvalidParameterType {
        object: String,
        key: String,
        expected: &'static str,
    },

    #[error("Invalid value for parameter `{key}` of `{object}`: {reason}")]
    InvalidParameterValue {
        object: String,
        key: String,
        reason: String,
    },

    #[error("Cannot set parameter `{key}` of `{object}`: parameter tree is frozen")]
    ImmutableParameter { object: String, key: String },

    #[error("Cyclic inheritance: {}", .cycle.join(" -> "))]
    CyclicInheritance { cycle: Vec<String> },

    #[error("Node `{node}` inherits from unknown node `{target}`")]
    UnknownInheritanceTarget { node: String, target: String },

    #[error("Unknown node `{0}`")]
    UnknownNode(String),

    #[error("Unrecognized child `{child}` under `{object}`")]
    UnrecognizedChild { object: String, child: String },

    #[error("Duplicate model name `{name}`")]
    DuplicateModel { name: String },

    #[error("Invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("Include cycle: {}", .cycle.join(" -> "))]
    IncludeCycle { cycle: Vec<String> },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl ConfigurationError {
    /// Shorthand used by typed accessors
    pub(crate) fn wrong_type(object: &str, key: &str, expected: &'static str) -> Self {
        ConfigurationError::InvalidParameterType {
            object: object.to_string(),
            key: key.to_string(),
            expected,
        }
    }
}
