// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Deterministic in-memory kernel.

Keeps the full object graph (models, nodes, layers, connections, statuses)
and a clock, and validates every call the way a real kernel would: unknown
models, unknown status keys, read-only entries and misaligned time steps are
all rejected. It performs no numerical integration.

Every successful mutating call is appended to a journal, so tests can check
exactly what was asked of the kernel and when.
*/

mod models;

use crate::error::{KernelError, KernelResult};
use crate::traits::Kernel;
use crate::types::{
    ConnectionFilter, ConnectionId, ConnectionRule, ElementType, LayerGeometry, LayerHandle,
    ModelInfo, NodeId, PlacedNode, Status,
};
use models::{builtin_models, BuiltinModel};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

const DEFAULT_RNG_SEED: u64 = 1;

/// A mutating call accepted by the in-memory kernel
#[derive(Debug, Clone, PartialEq)]
pub enum KernelCall {
    ResetKernel,
    ResetNetwork,
    SetKernelStatus(Status),
    InstallModule(String),
    CopyModel { base: String, name: String },
    Create { model: String, ids: Vec<NodeId> },
    CreateLayer { id: NodeId, elements: Vec<(String, usize)> },
    Connect { synapse_model: String, count: usize },
    ConnectLayers { source: NodeId, target: NodeId, count: usize },
    SetStatus { nodes: Vec<NodeId>, status: Status },
    SetConnectionStatus { count: usize, status: Status },
    Advance(f64),
}

/// Journal entry: simulated time of the call, and the call
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub time: f64,
    pub call: KernelCall,
}

#[derive(Debug, Clone)]
struct NodeEntry {
    model: String,
    status: Status,
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
    source: NodeId,
    target: NodeId,
    synapse_model: String,
    status: Status,
}

/// Bookkeeping kernel for tests and dry runs
pub struct InMemoryKernel {
    models: BTreeMap<String, ModelInfo>,
    receptors: BTreeMap<String, BTreeMap<String, u64>>,
    state_variables: BTreeMap<String, &'static [&'static str]>,
    nodes: Vec<NodeEntry>,
    layers: BTreeMap<NodeId, LayerHandle>,
    connections: Vec<ConnectionEntry>,
    status: Status,
    available_modules: BTreeSet<String>,
    loaded_modules: BTreeSet<String>,
    time: f64,
    rng: ChaCha8Rng,
    journal: Vec<JournalEntry>,
}

impl Default for InMemoryKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKernel {
    pub fn new() -> Self {
        let mut kernel = Self {
            models: BTreeMap::new(),
            receptors: BTreeMap::new(),
            state_variables: BTreeMap::new(),
            nodes: Vec::new(),
            layers: BTreeMap::new(),
            connections: Vec::new(),
            status: default_status(),
            available_modules: BTreeSet::new(),
            loaded_modules: BTreeSet::new(),
            time: 0.0,
            rng: ChaCha8Rng::seed_from_u64(DEFAULT_RNG_SEED),
            journal: Vec::new(),
        };
        kernel.load_builtins();
        kernel
    }

    /// Kernel whose `install_module` accepts the given module names
    pub fn with_modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kernel = Self::new();
        kernel.available_modules = modules.into_iter().map(Into::into).collect();
        kernel
    }

    fn load_builtins(&mut self) {
        self.models.clear();
        self.receptors.clear();
        self.state_variables.clear();
        for BuiltinModel {
            info,
            receptors,
            state_variables,
        } in builtin_models()
        {
            self.receptors.insert(info.name.clone(), receptors);
            self.state_variables.insert(info.name.clone(), state_variables);
            self.models.insert(info.name.clone(), info);
        }
    }

    /// Every mutating call accepted so far
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Number of mutating calls accepted so far
    pub fn mutation_count(&self) -> usize {
        self.journal.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    fn record(&mut self, call: KernelCall) {
        trace!(target: "denest-kernel", "t={} {:?}", self.time, call);
        self.journal.push(JournalEntry {
            time: self.time,
            call,
        });
    }

    fn model(&self, name: &str) -> KernelResult<&ModelInfo> {
        self.models
            .get(name)
            .ok_or_else(|| KernelError::UnknownModel(name.to_string()))
    }

    fn node(&self, id: NodeId) -> KernelResult<&NodeEntry> {
        id.checked_sub(1)
            .and_then(|index| self.nodes.get(index as usize))
            .ok_or(KernelError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> KernelResult<&mut NodeEntry> {
        id.checked_sub(1)
            .and_then(|index| self.nodes.get_mut(index as usize))
            .ok_or(KernelError::UnknownNode(id))
    }

    fn push_node(&mut self, model: &str, status: Status) -> NodeId {
        self.nodes.push(NodeEntry {
            model: model.to_string(),
            status,
        });
        self.nodes.len() as NodeId
    }

    fn resolution(&self) -> f64 {
        self.status
            .get("resolution")
            .and_then(Value::as_f64)
            .unwrap_or(0.1)
    }

    fn layer(&self, id: NodeId) -> KernelResult<&LayerHandle> {
        self.layers.get(&id).ok_or(KernelError::UnknownNode(id))
    }

    /// Reject keys absent from `known` and values whose JSON kind differs
    fn check_status_update(target: &str, known: &Status, update: &Status) -> KernelResult<()> {
        for (key, value) in update {
            let Some(current) = known.get(key) else {
                return Err(KernelError::UnknownStatusKey {
                    target: target.to_string(),
                    key: key.clone(),
                });
            };
            if !same_kind(current, value) {
                return Err(KernelError::InvalidStatus {
                    target: target.to_string(),
                    reason: format!("`{}` expects {}, got {}", key, kind_name(current), value),
                });
            }
        }
        Ok(())
    }

    fn synapse_status(&self, synapse: &Status) -> KernelResult<(String, Status)> {
        let synapse_model = match synapse.get("synapse_model") {
            None => "static_synapse".to_string(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(KernelError::InvalidConnection(format!(
                    "`synapse_model` must be a model name, got {}",
                    other
                )))
            }
        };
        let info = self.model(&synapse_model)?;
        if info.element_type != ElementType::Synapse {
            return Err(KernelError::InvalidConnection(format!(
                "`{}` is not a synapse model",
                synapse_model
            )));
        }
        let mut overrides = synapse.clone();
        overrides.remove("synapse_model");
        Self::check_status_update(&synapse_model, &info.defaults, &overrides)?;
        let mut status = info.defaults.clone();
        status.extend(overrides);
        Ok((synapse_model, status))
    }
}

fn default_status() -> Status {
    [
        ("resolution", json!(0.1)),
        ("local_num_threads", json!(1)),
        ("total_num_virtual_procs", json!(1)),
        ("data_path", json!(".")),
        ("data_prefix", json!("")),
        ("grng_seed", json!(0)),
        ("rng_seeds", json!([1])),
        ("overwrite_files", json!(false)),
        ("print_time", json!(false)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

fn same_kind(current: &Value, new: &Value) -> bool {
    match (current, new) {
        (Value::Null, _) | (_, Value::Null) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::String(_), Value::String(_)) => true,
        (Value::Array(_), Value::Array(_)) => true,
        (Value::Object(_), Value::Object(_)) => true,
        _ => false,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Spatial selection of a topological connection, in target grid units
enum Mask {
    All,
    Circular { radius: f64 },
    Rectangular { lower_left: (f64, f64), upper_right: (f64, f64) },
}

impl Mask {
    fn from_spec(spec: Option<&Value>) -> KernelResult<Self> {
        let Some(spec) = spec else {
            return Ok(Mask::All);
        };
        let invalid = || KernelError::InvalidConnection(format!("unsupported mask {}", spec));
        if let Some(radius) = spec.pointer("/circular/radius").and_then(Value::as_f64) {
            return Ok(Mask::Circular { radius });
        }
        if let Some(rect) = spec.get("rectangular") {
            let corner = |key: &str| -> Option<(f64, f64)> {
                let pair = rect.get(key)?.as_array()?;
                Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
            };
            return match (corner("lower_left"), corner("upper_right")) {
                (Some(lower_left), Some(upper_right)) => Ok(Mask::Rectangular {
                    lower_left,
                    upper_right,
                }),
                _ => Err(invalid()),
            };
        }
        Err(invalid())
    }

    /// `dx` along columns, `dy` along rows
    fn contains(&self, dx: f64, dy: f64) -> bool {
        match self {
            Mask::All => true,
            Mask::Circular { radius } => dx * dx + dy * dy <= radius * radius + 1e-9,
            Mask::Rectangular {
                lower_left,
                upper_right,
            } => {
                dx >= lower_left.0 - 1e-9
                    && dx <= upper_right.0 + 1e-9
                    && dy >= lower_left.1 - 1e-9
                    && dy <= upper_right.1 + 1e-9
            }
        }
    }
}

/// Displacement from `from` (in a grid of `from_len`) to `to` (in a grid of
/// `to_len`), in target grid units, wrapped when the target is periodic
fn displacement(from: usize, from_len: usize, to: usize, to_len: usize, wrap: bool) -> f64 {
    let projected = (from as f64 + 0.5) * to_len as f64 / from_len as f64 - 0.5;
    let mut delta = to as f64 - projected;
    if wrap {
        let len = to_len as f64;
        while delta > len / 2.0 {
            delta -= len;
        }
        while delta < -len / 2.0 {
            delta += len;
        }
    }
    delta
}

fn population_filter(spec: &Status, key: &str) -> KernelResult<Option<String>> {
    match spec.get(key) {
        None => Ok(None),
        Some(selector) => match selector.get("model") {
            Some(Value::String(model)) => Ok(Some(model.clone())),
            _ => Err(KernelError::InvalidConnection(format!(
                "`{}` must be of the form {{\"model\": <name>}}",
                key
            ))),
        },
    }
}

const CONNECT_LAYERS_KEYS: &[&str] = &[
    "allow_autapses",
    "allow_multapses",
    "connection_type",
    "delays",
    "kernel",
    "mask",
    "sources",
    "synapse_model",
    "targets",
    "weights",
];

impl Kernel for InMemoryKernel {
    fn reset_kernel(&mut self) -> KernelResult<()> {
        self.load_builtins();
        self.nodes.clear();
        self.layers.clear();
        self.connections.clear();
        self.status = default_status();
        self.loaded_modules.clear();
        self.time = 0.0;
        self.rng = ChaCha8Rng::seed_from_u64(DEFAULT_RNG_SEED);
        self.record(KernelCall::ResetKernel);
        Ok(())
    }

    fn reset_network(&mut self) -> KernelResult<()> {
        for index in 0..self.nodes.len() {
            let model_name = self.nodes[index].model.clone();
            let Some(info) = self.models.get(&model_name) else {
                continue;
            };
            let Some(variables) = self.state_variables.get(&info.base) else {
                continue;
            };
            let restored: Vec<(String, Value)> = variables
                .iter()
                .filter_map(|var| info.defaults.get(*var).map(|v| (var.to_string(), v.clone())))
                .collect();
            let node = &mut self.nodes[index];
            for (key, value) in restored {
                node.status.insert(key, value);
            }
        }
        self.record(KernelCall::ResetNetwork);
        Ok(())
    }

    fn set_kernel_status(&mut self, status: &Status) -> KernelResult<()> {
        for (key, value) in status {
            match key.as_str() {
                "time" | "total_num_virtual_procs" => {
                    return Err(KernelError::ReadOnlyStatus(key.clone()))
                }
                "resolution" | "local_num_threads" if !self.nodes.is_empty() => {
                    return Err(KernelError::InvalidStatus {
                        target: "kernel".to_string(),
                        reason: format!("`{}` cannot change once nodes exist", key),
                    })
                }
                "resolution" => {
                    if !value.as_f64().is_some_and(|r| r > 0.0) {
                        return Err(KernelError::InvalidStatus {
                            target: "kernel".to_string(),
                            reason: format!("resolution must be positive, got {}", value),
                        });
                    }
                }
                "local_num_threads" => {
                    if !value.as_u64().is_some_and(|n| n >= 1) {
                        return Err(KernelError::InvalidStatus {
                            target: "kernel".to_string(),
                            reason: format!("local_num_threads must be >= 1, got {}", value),
                        });
                    }
                }
                "grng_seed" => {
                    if value.as_u64().is_none() {
                        return Err(KernelError::InvalidStatus {
                            target: "kernel".to_string(),
                            reason: format!("grng_seed must be an unsigned integer, got {}", value),
                        });
                    }
                }
                _ => {}
            }
        }
        Self::check_status_update("kernel", &self.status, status)?;

        for (key, value) in status {
            self.status.insert(key.clone(), value.clone());
        }
        if let Some(threads) = status.get("local_num_threads") {
            self.status
                .insert("total_num_virtual_procs".to_string(), threads.clone());
        }
        if let Some(seed) = status.get("grng_seed").and_then(Value::as_u64) {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self.record(KernelCall::SetKernelStatus(status.clone()));
        Ok(())
    }

    fn kernel_status(&self) -> Status {
        let mut status = self.status.clone();
        status.insert("time".to_string(), json!(self.time));
        status
    }

    fn num_virtual_processes(&self) -> usize {
        self.status
            .get("total_num_virtual_procs")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize
    }

    fn install_module(&mut self, module: &str) -> KernelResult<()> {
        if self.loaded_modules.contains(module) {
            return Err(KernelError::ModuleAlreadyLoaded(module.to_string()));
        }
        if !self.available_modules.contains(module) {
            return Err(KernelError::ModuleNotFound(module.to_string()));
        }
        self.loaded_modules.insert(module.to_string());
        self.record(KernelCall::InstallModule(module.to_string()));
        Ok(())
    }

    fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    fn model_info(&self, model: &str) -> KernelResult<ModelInfo> {
        self.model(model).cloned()
    }

    fn copy_model(&mut self, base: &str, name: &str, defaults: &Status) -> KernelResult<()> {
        if self.models.contains_key(name) {
            return Err(KernelError::ModelExists(name.to_string()));
        }
        let base_info = self.model(base)?;
        Self::check_status_update(name, &base_info.defaults, defaults)?;
        let mut info = base_info.clone();
        info.name = name.to_string();
        info.defaults.extend(defaults.clone());
        debug!(target: "denest-kernel", "copy_model({} -> {})", base, name);
        self.models.insert(name.to_string(), info);
        self.record(KernelCall::CopyModel {
            base: base.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    fn receptor_types(&self, model: &str) -> KernelResult<BTreeMap<String, u64>> {
        let info = self.model(model)?;
        Ok(self.receptors.get(&info.base).cloned().unwrap_or_default())
    }

    fn create(&mut self, model: &str, count: usize, status: &Status) -> KernelResult<Vec<NodeId>> {
        let info = self.model(model)?;
        if info.element_type == ElementType::Synapse {
            return Err(KernelError::InvalidStatus {
                target: model.to_string(),
                reason: "synapse models cannot be instantiated as nodes".to_string(),
            });
        }
        Self::check_status_update(model, &info.defaults, status)?;
        let mut node_status = info.defaults.clone();
        node_status.extend(status.clone());
        let ids: Vec<NodeId> = (0..count)
            .map(|_| self.push_node(model, node_status.clone()))
            .collect();
        self.record(KernelCall::Create {
            model: model.to_string(),
            ids: ids.clone(),
        });
        Ok(ids)
    }

    fn create_layer(
        &mut self,
        geometry: &LayerGeometry,
        elements: &[(String, usize)],
        options: &Status,
    ) -> KernelResult<LayerHandle> {
        if geometry.rows == 0 || geometry.columns == 0 {
            return Err(KernelError::InvalidStatus {
                target: "layer".to_string(),
                reason: format!("empty layer shape {}x{}", geometry.rows, geometry.columns),
            });
        }
        if elements.is_empty() {
            return Err(KernelError::InvalidStatus {
                target: "layer".to_string(),
                reason: "layer has no elements".to_string(),
            });
        }
        for (model, count) in elements {
            let info = self.model(model)?;
            if matches!(info.element_type, ElementType::Synapse | ElementType::Recorder) {
                return Err(KernelError::InvalidStatus {
                    target: model.clone(),
                    reason: "layers may only hold neurons and stimulators".to_string(),
                });
            }
            if *count == 0 {
                return Err(KernelError::InvalidStatus {
                    target: model.clone(),
                    reason: "population has zero units per location".to_string(),
                });
            }
        }

        let mut layer_status = options.clone();
        layer_status.insert("rows".to_string(), json!(geometry.rows));
        layer_status.insert("columns".to_string(), json!(geometry.columns));
        layer_status.insert("edge_wrap".to_string(), json!(geometry.edge_wrap));
        let layer_id = self.push_node("topology_layer", layer_status);

        let mut nodes = Vec::with_capacity(geometry.locations());
        for row in 0..geometry.rows {
            for column in 0..geometry.columns {
                for (model, count) in elements {
                    let defaults = self.model(model)?.defaults.clone();
                    for unit in 0..*count {
                        let id = self.push_node(model, defaults.clone());
                        nodes.push(PlacedNode {
                            id,
                            model: model.clone(),
                            row,
                            column,
                            unit,
                        });
                    }
                }
            }
        }

        let handle = LayerHandle {
            id: layer_id,
            geometry: *geometry,
            nodes,
        };
        self.layers.insert(layer_id, handle.clone());
        self.record(KernelCall::CreateLayer {
            id: layer_id,
            elements: elements.to_vec(),
        });
        Ok(handle)
    }

    fn connect(
        &mut self,
        sources: &[NodeId],
        targets: &[NodeId],
        rule: ConnectionRule,
        synapse: &Status,
    ) -> KernelResult<usize> {
        for id in sources.iter().chain(targets) {
            self.node(*id)?;
        }
        let (synapse_model, status) = self.synapse_status(synapse)?;
        let pairs: Vec<(NodeId, NodeId)> = match rule {
            ConnectionRule::OneToOne => {
                if sources.len() != targets.len() {
                    return Err(KernelError::InvalidConnection(format!(
                        "one_to_one needs equal lengths, got {} sources and {} targets",
                        sources.len(),
                        targets.len()
                    )));
                }
                sources.iter().copied().zip(targets.iter().copied()).collect()
            }
            ConnectionRule::AllToAll => sources
                .iter()
                .flat_map(|s| targets.iter().map(move |t| (*s, *t)))
                .collect(),
        };
        let count = pairs.len();
        for (source, target) in pairs {
            self.connections.push(ConnectionEntry {
                source,
                target,
                synapse_model: synapse_model.clone(),
                status: status.clone(),
            });
        }
        self.record(KernelCall::Connect {
            synapse_model,
            count,
        });
        Ok(count)
    }

    fn connect_layers(&mut self, source: NodeId, target: NodeId, spec: &Status) -> KernelResult<usize> {
        for key in spec.keys() {
            if !CONNECT_LAYERS_KEYS.contains(&key.as_str()) {
                return Err(KernelError::UnknownStatusKey {
                    target: "connect_layers".to_string(),
                    key: key.clone(),
                });
            }
        }
        match spec.get("connection_type").and_then(Value::as_str) {
            Some("convergent") | Some("divergent") => {}
            other => {
                return Err(KernelError::InvalidConnection(format!(
                    "connection_type must be `convergent` or `divergent`, got {:?}",
                    other
                )))
            }
        }
        let probability = match spec.get("kernel") {
            None => 1.0,
            Some(value) => match value.as_f64() {
                Some(p) if (0.0..=1.0).contains(&p) => p,
                _ => {
                    return Err(KernelError::InvalidConnection(format!(
                        "kernel must be a probability in [0, 1], got {}",
                        value
                    )))
                }
            },
        };
        let mask = Mask::from_spec(spec.get("mask"))?;
        let source_model = population_filter(spec, "sources")?;
        let target_model = population_filter(spec, "targets")?;
        let allow_autapses = spec
            .get("allow_autapses")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut synapse = Status::new();
        if let Some(model) = spec.get("synapse_model") {
            synapse.insert("synapse_model".to_string(), model.clone());
        }
        if let Some(weight) = spec.get("weights") {
            synapse.insert("weight".to_string(), weight.clone());
        }
        if let Some(delay) = spec.get("delays") {
            synapse.insert("delay".to_string(), delay.clone());
        }
        let (synapse_model, status) = self.synapse_status(&synapse)?;

        let source_layer = self.layer(source)?.clone();
        let target_layer = self.layer(target)?.clone();
        let selected = |layer: &LayerHandle, model: &Option<String>| -> Vec<PlacedNode> {
            layer
                .nodes
                .iter()
                .filter(|n| model.as_ref().map_or(true, |m| n.model == *m))
                .cloned()
                .collect()
        };
        let source_nodes = selected(&source_layer, &source_model);
        let target_nodes = selected(&target_layer, &target_model);
        let src_geo = source_layer.geometry;
        let tgt_geo = target_layer.geometry;

        let mut count = 0;
        for s in &source_nodes {
            for t in &target_nodes {
                if !allow_autapses && s.id == t.id {
                    continue;
                }
                let dx = displacement(s.column, src_geo.columns, t.column, tgt_geo.columns, tgt_geo.edge_wrap);
                let dy = displacement(s.row, src_geo.rows, t.row, tgt_geo.rows, tgt_geo.edge_wrap);
                if !mask.contains(dx, dy) {
                    continue;
                }
                if probability < 1.0 && self.rng.gen::<f64>() >= probability {
                    continue;
                }
                self.connections.push(ConnectionEntry {
                    source: s.id,
                    target: t.id,
                    synapse_model: synapse_model.clone(),
                    status: status.clone(),
                });
                count += 1;
            }
        }
        self.record(KernelCall::ConnectLayers {
            source,
            target,
            count,
        });
        Ok(count)
    }

    fn set_status(&mut self, nodes: &[NodeId], status: &Status) -> KernelResult<()> {
        for id in nodes {
            let node = self.node(*id)?;
            Self::check_status_update(&format!("node {} ({})", id, node.model), &node.status, status)?;
        }
        for id in nodes {
            let node = self.node_mut(*id)?;
            for (key, value) in status {
                node.status.insert(key.clone(), value.clone());
            }
        }
        self.record(KernelCall::SetStatus {
            nodes: nodes.to_vec(),
            status: status.clone(),
        });
        Ok(())
    }

    fn get_status(&self, node: NodeId, key: &str) -> KernelResult<Value> {
        let entry = self.node(node)?;
        if key == "model" {
            return Ok(json!(entry.model));
        }
        entry
            .status
            .get(key)
            .cloned()
            .ok_or_else(|| KernelError::UnknownStatusKey {
                target: format!("node {} ({})", node, entry.model),
                key: key.to_string(),
            })
    }

    fn get_connections(&self, filter: &ConnectionFilter) -> KernelResult<Vec<ConnectionId>> {
        let sources: Option<BTreeSet<NodeId>> = filter.sources.as_ref().map(|s| s.iter().copied().collect());
        let targets: Option<BTreeSet<NodeId>> = filter.targets.as_ref().map(|t| t.iter().copied().collect());
        Ok(self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.synapse_model.as_ref().map_or(true, |m| c.synapse_model == *m))
            .filter(|(_, c)| sources.as_ref().map_or(true, |s| s.contains(&c.source)))
            .filter(|(_, c)| targets.as_ref().map_or(true, |t| t.contains(&c.target)))
            .map(|(index, _)| ConnectionId(index))
            .collect())
    }

    fn set_connection_status(&mut self, connections: &[ConnectionId], status: &Status) -> KernelResult<()> {
        for id in connections {
            let entry = self
                .connections
                .get(id.0)
                .ok_or(KernelError::UnknownConnection(id.0))?;
            Self::check_status_update(&entry.synapse_model, &entry.status, status)?;
        }
        for id in connections {
            if let Some(entry) = self.connections.get_mut(id.0) {
                for (key, value) in status {
                    entry.status.insert(key.clone(), value.clone());
                }
            }
        }
        self.record(KernelCall::SetConnectionStatus {
            count: connections.len(),
            status: status.clone(),
        });
        Ok(())
    }

    fn get_connection_status(&self, connection: ConnectionId, key: &str) -> KernelResult<Value> {
        let entry = self
            .connections
            .get(connection.0)
            .ok_or(KernelError::UnknownConnection(connection.0))?;
        match key {
            "source" => Ok(json!(entry.source)),
            "target" => Ok(json!(entry.target)),
            "synapse_model" => Ok(json!(entry.synapse_model)),
            _ => entry
                .status
                .get(key)
                .cloned()
                .ok_or_else(|| KernelError::UnknownStatusKey {
                    target: entry.synapse_model.clone(),
                    key: key.to_string(),
                }),
        }
    }

    fn advance(&mut self, duration_ms: f64) -> KernelResult<()> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(KernelError::InvalidTime(format!(
                "duration must be finite and non-negative, got {}",
                duration_ms
            )));
        }
        let steps = duration_ms / self.resolution();
        if (steps - steps.round()).abs() > 1e-6 {
            return Err(KernelError::InvalidTime(format!(
                "duration {} ms is not a multiple of the resolution {} ms",
                duration_ms,
                self.resolution()
            )));
        }
        self.record(KernelCall::Advance(duration_ms));
        self.time += duration_ms;
        Ok(())
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn version(&self) -> String {
        format!("denest-memory-kernel {}", crate::VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(value: Value) -> Status {
        serde_json::from_value(value).unwrap()
    }

    fn grid(rows: usize, columns: usize) -> LayerGeometry {
        LayerGeometry {
            rows,
            columns,
            edge_wrap: false,
        }
    }

    #[test]
    fn test_copy_model_checks_keys() {
        let mut kernel = InMemoryKernel::new();
        kernel
            .copy_model("iaf_psc_alpha", "exc", &status(json!({"tau_m": 20.0})))
            .unwrap();
        assert_eq!(kernel.model_info("exc").unwrap().defaults["tau_m"], json!(20.0));
        assert_eq!(kernel.model_info("exc").unwrap().base, "iaf_psc_alpha");

        let err = kernel
            .copy_model("iaf_psc_alpha", "bad", &status(json!({"tau_x": 1.0})))
            .unwrap_err();
        assert!(matches!(err, KernelError::UnknownStatusKey { .. }));
        assert!(matches!(
            kernel.copy_model("iaf_psc_alpha", "exc", &Status::new()),
            Err(KernelError::ModelExists(_))
        ));
    }

    #[test]
    fn test_layer_layout_is_row_major() {
        let mut kernel = InMemoryKernel::new();
        let layer = kernel
            .create_layer(
                &grid(2, 3),
                &[("iaf_psc_alpha".to_string(), 2), ("parrot_neuron".to_string(), 1)],
                &Status::new(),
            )
            .unwrap();
        assert_eq!(layer.nodes.len(), 2 * 3 * 3);
        let first = &layer.nodes[0];
        assert_eq!((first.row, first.column, first.unit), (0, 0, 0));
        let fourth = &layer.nodes[3];
        assert_eq!((fourth.row, fourth.column, fourth.model.as_str()), (0, 1, "iaf_psc_alpha"));
    }

    #[test]
    fn test_connect_layers_circular_mask() {
        let mut kernel = InMemoryKernel::new();
        let a = kernel
            .create_layer(&grid(3, 3), &[("iaf_psc_alpha".to_string(), 1)], &Status::new())
            .unwrap();
        let b = kernel
            .create_layer(&grid(3, 3), &[("iaf_psc_alpha".to_string(), 1)], &Status::new())
            .unwrap();
        let count = kernel
            .connect_layers(
                a.id,
                b.id,
                &status(json!({
                    "connection_type": "convergent",
                    "synapse_model": "static_synapse",
                    "mask": {"circular": {"radius": 0.1}},
                    "weights": 2.0
                })),
            )
            .unwrap();
        assert_eq!(count, 9);
        let conns = kernel
            .get_connections(&ConnectionFilter::synapse_model("static_synapse"))
            .unwrap();
        assert_eq!(conns.len(), 9);
        assert_eq!(kernel.get_connection_status(conns[0], "weight").unwrap(), json!(2.0));
    }

    #[test]
    fn test_connect_layers_is_seeded() {
        let run = |seed: u64| {
            let mut kernel = InMemoryKernel::new();
            kernel
                .set_kernel_status(&status(json!({"grng_seed": seed})))
                .unwrap();
            let a = kernel
                .create_layer(&grid(4, 4), &[("iaf_psc_alpha".to_string(), 1)], &Status::new())
                .unwrap();
            kernel
                .connect_layers(
                    a.id,
                    a.id,
                    &status(json!({"connection_type": "divergent", "kernel": 0.5})),
                )
                .unwrap()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_set_status_is_all_or_nothing() {
        let mut kernel = InMemoryKernel::new();
        let parrot = kernel.create("parrot_neuron", 1, &Status::new()).unwrap();
        let iaf = kernel.create("iaf_psc_alpha", 1, &Status::new()).unwrap();
        let before = kernel.mutation_count();
        let err = kernel
            .set_status(&[iaf[0], parrot[0]], &status(json!({"V_m": -60.0})))
            .unwrap_err();
        assert!(matches!(err, KernelError::UnknownStatusKey { .. }));
        assert_eq!(kernel.get_status(iaf[0], "V_m").unwrap(), json!(-70.0));
        assert_eq!(kernel.mutation_count(), before);
    }

    #[test]
    fn test_reset_network_restores_state_only() {
        let mut kernel = InMemoryKernel::new();
        let ids = kernel.create("iaf_psc_alpha", 1, &Status::new()).unwrap();
        kernel
            .set_status(&ids, &status(json!({"V_m": -60.0, "I_e": 5.0})))
            .unwrap();
        kernel.advance(10.0).unwrap();
        kernel.reset_network().unwrap();
        assert_eq!(kernel.get_status(ids[0], "V_m").unwrap(), json!(-70.0));
        assert_eq!(kernel.get_status(ids[0], "I_e").unwrap(), json!(5.0));
        assert_eq!(kernel.time(), 10.0);
    }

    #[test]
    fn test_advance_checks_resolution() {
        let mut kernel = InMemoryKernel::new();
        kernel.advance(100.0).unwrap();
        assert!(matches!(kernel.advance(0.05), Err(KernelError::InvalidTime(_))));
        assert_eq!(kernel.time(), 100.0);
    }

    #[test]
    fn test_modules() {
        let mut kernel = InMemoryKernel::with_modules(["extmodule"]);
        kernel.install_module("extmodule").unwrap();
        assert!(matches!(
            kernel.install_module("extmodule"),
            Err(KernelError::ModuleAlreadyLoaded(_))
        ));
        assert!(matches!(
            kernel.install_module("other"),
            Err(KernelError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_kernel_status_rules() {
        let mut kernel = InMemoryKernel::new();
        kernel
            .set_kernel_status(&status(json!({"local_num_threads": 4})))
            .unwrap();
        assert_eq!(kernel.num_virtual_processes(), 4);
        assert!(matches!(
            kernel.set_kernel_status(&status(json!({"time": 3.0}))),
            Err(KernelError::ReadOnlyStatus(_))
        ));
        kernel.create("parrot_neuron", 1, &Status::new()).unwrap();
        assert!(kernel
            .set_kernel_status(&status(json!({"resolution": 1.0})))
            .is_err());
    }
}
