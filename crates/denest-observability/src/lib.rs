// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # denest-observability
//!
//! Logging setup shared by the denest binaries, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: per-run JSON log files

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known denest crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "denest-params",
    "denest-kernel",
    "denest-network",
    "denest-simulation",
    "denest-config",
];
