// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types exchanged with a kernel.

Identities are always assigned by the kernel. Callers keep them in
name→identity tables and never invent them.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kernel-assigned node identity
pub type NodeId = u64;

/// Status dictionary (model defaults, node status, kernel status)
pub type Status = BTreeMap<String, Value>;

/// Kernel-assigned connection identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub usize);

/// Kind of object a model instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Neuron,
    Stimulator,
    Recorder,
    Synapse,
}

/// How a recorder is wired to what it records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// Receives events from the recorded units (spike detectors)
    Events,
    /// Samples state variables by connecting to the recorded units (multimeters)
    Sampled,
    /// Attached to a synapse model rather than to units (weight recorders)
    Synaptic,
}

/// Static description of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Built-in model this one was derived from (itself for built-ins)
    pub base: String,
    pub element_type: ElementType,
    pub recording_mode: Option<RecordingMode>,
    pub defaults: Status,
}

/// Grid geometry of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGeometry {
    pub rows: usize,
    pub columns: usize,
    /// Periodic boundary conditions
    pub edge_wrap: bool,
}

impl LayerGeometry {
    pub fn locations(&self) -> usize {
        self.rows * self.columns
    }
}

/// One unit of a layer, with its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedNode {
    pub id: NodeId,
    pub model: String,
    pub row: usize,
    pub column: usize,
    /// Index of the unit among the units of its population at this location
    pub unit: usize,
}

/// Handle of a created layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerHandle {
    pub id: NodeId,
    pub geometry: LayerGeometry,
    /// Units in creation order: row-major locations, populations in
    /// declared order within each location
    pub nodes: Vec<PlacedNode>,
}

/// Pairing rule for [`crate::Kernel::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRule {
    OneToOne,
    AllToAll,
}

/// Selection of existing connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionFilter {
    pub synapse_model: Option<String>,
    pub sources: Option<Vec<NodeId>>,
    pub targets: Option<Vec<NodeId>>,
}

impl ConnectionFilter {
    pub fn synapse_model(model: &str) -> Self {
        Self {
            synapse_model: Some(model.to_string()),
            ..Self::default()
        }
    }
}
