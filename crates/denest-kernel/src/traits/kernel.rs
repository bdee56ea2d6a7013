// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The kernel trait consumed by the network builder and the session engine
//!
//! ## Design Philosophy
//!
//! - **Opaque**: every call is synchronous and either succeeds or fails whole
//! - **Kernel-owned identity**: node and connection ids come from the kernel
//! - **Object safe**: callers hold `&mut dyn Kernel`

use crate::error::{KernelError, KernelResult};
use crate::types::{
    ConnectionFilter, ConnectionId, ConnectionRule, ElementType, LayerGeometry, LayerHandle,
    ModelInfo, NodeId, Status,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Simulation kernel
///
/// # Example
///
/// ```ignore
/// let mut kernel = InMemoryKernel::new();
/// kernel.copy_model("iaf_psc_alpha", "l1_exc", &status)?;
/// let layer = kernel.create_layer(&geometry, &[("l1_exc".into(), 2)], &Status::new())?;
/// kernel.advance(100.0)?;
/// ```
pub trait Kernel {
    /// Drop every model copy, node and connection and rewind time to 0
    fn reset_kernel(&mut self) -> KernelResult<()>;

    /// Reset dynamic state of every node, keeping the object graph and time
    fn reset_network(&mut self) -> KernelResult<()>;

    /// Set global options
    fn set_kernel_status(&mut self, status: &Status) -> KernelResult<()>;

    /// Current global options, including read-only entries such as `time`
    fn kernel_status(&self) -> Status;

    /// Total number of virtual processes (threads × processes)
    fn num_virtual_processes(&self) -> usize;

    /// Load an external model module
    ///
    /// Fails with [`crate::KernelError::ModuleAlreadyLoaded`] if the module
    /// is already present.
    fn install_module(&mut self, module: &str) -> KernelResult<()>;

    fn has_model(&self, model: &str) -> bool;

    fn model_info(&self, model: &str) -> KernelResult<ModelInfo>;

    /// Derive a new named model from `base` with overridden defaults
    fn copy_model(&mut self, base: &str, name: &str, defaults: &Status) -> KernelResult<()>;

    /// Receptor name → port index for a neuron model
    fn receptor_types(&self, model: &str) -> KernelResult<BTreeMap<String, u64>>;

    /// Create `count` free-standing nodes (recorders, devices)
    fn create(&mut self, model: &str, count: usize, status: &Status) -> KernelResult<Vec<NodeId>>;

    /// Create a grid layer holding `elements` (model, units per location)
    fn create_layer(
        &mut self,
        geometry: &LayerGeometry,
        elements: &[(String, usize)],
        options: &Status,
    ) -> KernelResult<LayerHandle>;

    /// Connect explicit node lists; `synapse` holds `synapse_model` and
    /// synapse parameters. Returns the number of connections made.
    fn connect(
        &mut self,
        sources: &[NodeId],
        targets: &[NodeId],
        rule: ConnectionRule,
        synapse: &Status,
    ) -> KernelResult<usize>;

    /// Topological connection between two layers. Returns the number of
    /// connections made.
    fn connect_layers(&mut self, source: NodeId, target: NodeId, spec: &Status) -> KernelResult<usize>;

    /// Create one recording device
    fn create_recorder(&mut self, model: &str, status: &Status) -> KernelResult<NodeId> {
        let info = self.model_info(model)?;
        if info.element_type != ElementType::Recorder {
            return Err(KernelError::InvalidStatus {
                target: model.to_string(),
                reason: "not a recorder model".to_string(),
            });
        }
        let ids = self.create(model, 1, status)?;
        ids.first()
            .copied()
            .ok_or_else(|| KernelError::Backend(format!("`{}`: no recorder created", model)))
    }

    fn set_status(&mut self, nodes: &[NodeId], status: &Status) -> KernelResult<()>;

    fn get_status(&self, node: NodeId, key: &str) -> KernelResult<Value>;

    fn get_connections(&self, filter: &ConnectionFilter) -> KernelResult<Vec<ConnectionId>>;

    fn set_connection_status(&mut self, connections: &[ConnectionId], status: &Status) -> KernelResult<()>;

    fn get_connection_status(&self, connection: ConnectionId, key: &str) -> KernelResult<Value>;

    /// Advance simulated time by `duration_ms`
    fn advance(&mut self, duration_ms: f64) -> KernelResult<()>;

    /// Current simulated time in milliseconds
    fn time(&self) -> f64;

    fn version(&self) -> String;
}
