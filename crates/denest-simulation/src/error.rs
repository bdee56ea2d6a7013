// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for sessions and whole runs

use denest_kernel::KernelError;
use denest_network::{ChangeError, NetworkBuildError};
use denest_params::ConfigurationError;
use std::path::PathBuf;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

pub type SimulationResult<T> = Result<T, SimulationError>;

/// Failure while initializing or running one session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session `{session}`: kernel error: {source}")]
    Kernel {
        session: String,
        #[source]
        source: KernelError,
    },

    #[error("Session `{session}`: {source}")]
    Change {
        session: String,
        #[source]
        source: ChangeError,
    },

    #[error("Session `{session}`: kernel clock is at {actual} ms, expected {expected} ms")]
    ClockMismatch {
        session: String,
        expected: f64,
        actual: f64,
    },

    #[error("Session `{session}`: change `{change}` is proportional, but layer `{layer}` was already changed in this run")]
    RepeatedProportionalChange {
        session: String,
        change: String,
        layer: String,
    },

    #[error("Session `{session}` cannot {action} from state {state:?}")]
    InvalidState {
        session: String,
        state: crate::session::SessionState,
        action: &'static str,
    },
}

impl SessionError {
    pub(crate) fn kernel(session: &str) -> impl FnOnce(KernelError) -> Self + '_ {
        move |source| SessionError::Kernel {
            session: session.to_string(),
            source,
        }
    }

    pub(crate) fn change(session: &str) -> impl FnOnce(ChangeError) -> Self + '_ {
        move |source| SessionError::Change {
            session: session.to_string(),
            source,
        }
    }
}

/// Any failure of a run
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Network build error: {0}")]
    Build(#[from] NetworkBuildError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Kernel initialization error: {0}")]
    Kernel(#[from] KernelError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimulationError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SimulationError::Io { path, source }
    }
}
