// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # denest - declarative network simulations
//!
//! A simulation is described by one hierarchical parameter tree: kernel
//! options, a network (models, layers, projections, recorders), session
//! models, and the sequence of sessions to run. Nodes inherit parameters from
//! their ancestors, so a large network is described with little repetition.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! denest = "0.0.1-beta.18"
//! ```
//!
//! ```rust,no_run
//! use denest::{run, RunOverrides};
//! use std::path::PathBuf;
//!
//! let summary = run(&[PathBuf::from("params/tree.toml")], &RunOverrides::default())?;
//! for (start, end) in summary.timing.intervals() {
//!     println!("{start} → {end} ms");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: denest-params                              │
//! │  (Parameter trees, inheritance, schemas)                │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Kernel: denest-kernel                                  │
//! │  (Kernel interface, in-memory kernel)                   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Model: denest-network                                  │
//! │  (Specs, ordered build, unit/synapse changes)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application: denest-simulation                         │
//! │  (Sessions, run metadata, `denest` binary)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! `denest-config` and `denest-observability` carry the runtime
//! configuration file and logging setup used by the binary.
//!
//! ## License
//!
//! Apache-2.0

pub use denest_config as config;
pub use denest_kernel as kernel;
pub use denest_network as network;
pub use denest_observability as observability;
pub use denest_params as params;
pub use denest_simulation as simulation;

pub use denest_simulation::{run, RunOverrides, RunSummary, Simulation, SimulationError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::kernel::{InMemoryKernel, Kernel, KernelConfig};
    pub use crate::network::{LiveNetwork, NetworkBuilder, NetworkSpec, SynapseChange, UnitChange};
    pub use crate::params::{ConfigurationError, NodePath, ParamTree, TreeMerger};
    pub use crate::simulation::{Session, SessionState, Simulation, TimingTable};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
