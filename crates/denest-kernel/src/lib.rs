// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# denest-kernel

Interface to the simulation kernel that hosts models, units, connections and
the simulated clock.

Everything above this crate (network builder, session engine) talks to a
`&mut dyn Kernel` and never holds kernel state of its own beyond the
identities the kernel hands back.

- [`Kernel`]: the object-safe kernel trait
- [`KernelConfig`]: once-per-run global configuration and seed derivation
- [`InMemoryKernel`]: deterministic bookkeeping kernel (feature `memory`)
*/

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

#[cfg(feature = "memory")]
pub mod memory_impl;

pub use config::{KernelConfig, SeedPlan, RESERVED_KERNEL_KEYS};
pub use error::{KernelError, KernelResult};
pub use traits::Kernel;
pub use types::{
    ConnectionFilter, ConnectionId, ConnectionRule, ElementType, LayerGeometry, LayerHandle,
    ModelInfo, NodeId, PlacedNode, RecordingMode, Status,
};

#[cfg(feature = "memory")]
pub use memory_impl::{InMemoryKernel, JournalEntry, KernelCall};
