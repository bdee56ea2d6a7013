// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # denest-params
//!
//! Parameter trees for denest simulations.
//!
//! - [`ParamTree`]: arena of nodes keyed by [`NodePath`], frozen after loading
//! - [`TreeMerger`]: memoized inheritance resolution with cycle detection
//! - [`Schema`] / [`ResolvedParams`]: strict validation with defaults
//! - [`loader`]: JSON/TOML documents with includes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use denest_params::{load_tree, NodePath, Schema, TreeMerger};
//!
//! let mut tree = load_tree(std::path::Path::new("tree.json")).unwrap();
//! tree.freeze();
//! let mut merger = TreeMerger::new(&tree);
//! let node = merger.resolve(&NodePath::parse("simulation")).unwrap();
//! let sim = Schema::new()
//!     .optional("sessions", serde_json::json!([]))
//!     .validate("simulation", &node.params)
//!     .unwrap();
//! ```

use serde_json::Value;
use std::collections::BTreeMap;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod loader;
pub mod merge;
pub mod path;
pub mod schema;
pub mod tree;

/// Raw key→value parameters of one node, sorted by key
pub type ParamMap = BTreeMap<String, Value>;

pub use error::{ConfigurationError, ParamsResult};
pub use loader::{load_tree, load_trees, parse_document, tree_from_value};
pub use merge::{ResolvedNode, TreeMerger};
pub use path::NodePath;
pub use schema::{ResolvedParams, Schema};
pub use tree::{ParamGroup, ParamNode, ParamTree};
