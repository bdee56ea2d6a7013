// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for network construction and live-network changes

use denest_kernel::KernelError;
use denest_params::ConfigurationError;
use thiserror::Error;

/// Result type for network construction
pub type NetworkResult<T> = Result<T, NetworkBuildError>;

/// Errors raised while assembling specs or building the network
#[derive(Debug, Error)]
pub enum NetworkBuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("`{object}` references undeclared {kind} `{name}`")]
    UnknownReference {
        object: String,
        kind: &'static str,
        name: String,
    },

    #[error("Invalid model `{name}`: {reason}")]
    InvalidModel { name: String, reason: String },

    #[error("Invalid layer `{name}`: {reason}")]
    InvalidLayer { name: String, reason: String },

    #[error("Invalid projection `{name}`: {reason}")]
    InvalidProjection { name: String, reason: String },

    #[error("Invalid recorder `{name}`: {reason}")]
    InvalidRecorder { name: String, reason: String },

    #[error("Duplicate layer name `{0}`")]
    DuplicateLayer(String),

    #[error("Duplicate projection `{0}`")]
    DuplicateProjection(String),

    #[error("Kernel rejected `{object}`: {source}")]
    Kernel {
        object: String,
        #[source]
        source: KernelError,
    },
}

impl NetworkBuildError {
    pub(crate) fn kernel(object: impl Into<String>) -> impl FnOnce(KernelError) -> Self {
        let object = object.into();
        move |source| NetworkBuildError::Kernel { object, source }
    }
}

/// Result type for changes applied to a live network
pub type ChangeResult<T> = Result<T, ChangeError>;

/// Errors raised while parsing or applying a unit or synapse change
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Change `{change}` selects nothing")]
    NoTargets { change: String },

    #[error("Invalid change `{change}`: {reason}")]
    InvalidChange { change: String, reason: String },

    #[error("Kernel rejected change `{change}`: {source}")]
    Kernel {
        change: String,
        #[source]
        source: KernelError,
    },
}
