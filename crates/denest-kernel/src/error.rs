// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for kernel operations

use crate::types::NodeId;
use thiserror::Error;

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors reported by a kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Unknown model `{0}`")]
    UnknownModel(String),

    #[error("Model `{0}` already exists")]
    ModelExists(String),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Unknown connection {0}")]
    UnknownConnection(usize),

    #[error("`{target}` has no status entry `{key}`")]
    UnknownStatusKey { target: String, key: String },

    #[error("Status entry `{0}` is read-only")]
    ReadOnlyStatus(String),

    #[error("Invalid status for `{target}`: {reason}")]
    InvalidStatus { target: String, reason: String },

    #[error("Module `{0}` is already loaded")]
    ModuleAlreadyLoaded(String),

    #[error("Module `{0}` not found")]
    ModuleNotFound(String),

    #[error("Invalid simulation time: {0}")]
    InvalidTime(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Error raised by an external kernel binding
    #[error("Kernel backend error: {0}")]
    Backend(String),
}
