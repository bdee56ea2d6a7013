// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Layer specs and their construction.

A layer is a `rows x columns` grid; every location holds the same
populations. Input layers hold exactly one population of stimulation devices
with one unit per location, and receive a population of
[`PARROT_MODEL`] relays that the stimulators drive one-to-one.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use crate::models::PARROT_MODEL;
use denest_kernel::{ConnectionRule, Kernel, LayerGeometry, LayerHandle, NodeId, Status};
use denest_params::{ResolvedNode, Schema};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// Value of `params.type` marking an input layer
pub const INPUT_LAYER_TYPE: &str = "InputLayer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Layer,
    InputLayer,
}

impl LayerKind {
    /// Name used by `layer_type` selectors
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Layer => "layer",
            LayerKind::InputLayer => "input_layer",
        }
    }
}

/// Declared layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
    /// (model, units per location), sorted by model name
    pub populations: Vec<(String, usize)>,
    pub geometry: LayerGeometry,
    /// Remaining `kernel_params`, passed through to the kernel
    pub options: Status,
}

impl LayerSpec {
    pub fn from_resolved(name: &str, node: &ResolvedNode) -> NetworkResult<Self> {
        let params = Schema::new()
            .mandatory("populations")
            .optional("type", Value::Null)
            .validate(name, &node.params)?;
        let kernel_params = Schema::open()
            .mandatory("rows")
            .mandatory("columns")
            .optional("edge_wrap", false)
            .reserved("elements")
            .validate(name, &node.kernel_params)?;

        let kind = match params.get_opt_str("type")? {
            None => LayerKind::Layer,
            Some(INPUT_LAYER_TYPE) => LayerKind::InputLayer,
            Some(other) => {
                return Err(NetworkBuildError::InvalidLayer {
                    name: name.to_string(),
                    reason: format!("unknown layer type `{}`", other),
                })
            }
        };

        let mut populations = Vec::new();
        for (model, count) in params.get_map("populations")? {
            let count = count.as_u64().filter(|c| *c > 0).ok_or_else(|| {
                NetworkBuildError::InvalidLayer {
                    name: name.to_string(),
                    reason: format!("population `{}` needs a positive unit count, got {}", model, count),
                }
            })?;
            populations.push((model.clone(), count as usize));
        }
        populations.sort();
        if populations.is_empty() {
            return Err(NetworkBuildError::InvalidLayer {
                name: name.to_string(),
                reason: "no populations".to_string(),
            });
        }
        if kind == LayerKind::InputLayer {
            if populations.len() != 1 || populations[0].1 != 1 {
                return Err(NetworkBuildError::InvalidLayer {
                    name: name.to_string(),
                    reason: "an input layer holds exactly one population with one unit per location"
                        .to_string(),
                });
            }
        } else if populations.iter().any(|(model, _)| model == PARROT_MODEL) {
            return Err(NetworkBuildError::InvalidLayer {
                name: name.to_string(),
                reason: format!("`{}` populations are reserved for input layers", PARROT_MODEL),
            });
        }

        let geometry = LayerGeometry {
            rows: kernel_params.get_u64("rows")? as usize,
            columns: kernel_params.get_u64("columns")? as usize,
            edge_wrap: kernel_params.get_bool("edge_wrap")?,
        };
        if geometry.locations() == 0 {
            return Err(NetworkBuildError::InvalidLayer {
                name: name.to_string(),
                reason: format!("empty shape {}x{}", geometry.rows, geometry.columns),
            });
        }
        let mut options = kernel_params.as_map().clone();
        for key in ["rows", "columns", "edge_wrap"] {
            options.remove(key);
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            populations,
            geometry,
            options,
        })
    }

    /// Population names as they exist in the kernel, including the relays
    /// of an input layer
    pub fn population_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.populations.iter().map(|(m, _)| m.as_str()).collect();
        if self.kind == LayerKind::InputLayer {
            names.push(PARROT_MODEL);
        }
        names
    }

    pub fn has_population(&self, population: &str) -> bool {
        self.population_names().contains(&population)
    }

    /// Stimulator population of an input layer
    pub fn stimulator_model(&self) -> Option<&str> {
        match self.kind {
            LayerKind::InputLayer => self.populations.first().map(|(m, _)| m.as_str()),
            LayerKind::Layer => None,
        }
    }

    fn elements(&self) -> Vec<(String, usize)> {
        let mut elements = self.populations.clone();
        if self.kind == LayerKind::InputLayer {
            elements.push((PARROT_MODEL.to_string(), 1));
        }
        elements
    }
}

/// A layer as it exists in the kernel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveLayer {
    pub spec: LayerSpec,
    pub handle: LayerHandle,
}

impl LiveLayer {
    /// Create the layer and, for input layers, wire stimulators to relays
    pub fn create(spec: &LayerSpec, kernel: &mut dyn Kernel) -> NetworkResult<Self> {
        let handle = kernel
            .create_layer(&spec.geometry, &spec.elements(), &spec.options)
            .map_err(NetworkBuildError::kernel(&spec.name))?;
        let layer = Self {
            spec: spec.clone(),
            handle,
        };

        if let Some(stimulator) = spec.stimulator_model() {
            let sources = layer.population_ids(stimulator);
            let targets = layer.population_ids(PARROT_MODEL);
            let mut synapse = Status::new();
            synapse.insert("synapse_model".to_string(), json!("static_synapse"));
            let count = kernel
                .connect(&sources, &targets, ConnectionRule::OneToOne, &synapse)
                .map_err(NetworkBuildError::kernel(&spec.name))?;
            debug!(
                target: "denest-network",
                "  Input layer `{}`: {} stimulators -> {} relays",
                spec.name, count, PARROT_MODEL
            );
        }
        Ok(layer)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> LayerKind {
        self.spec.kind
    }

    /// Ids of one population, in layout order
    pub fn population_ids(&self, population: &str) -> Vec<NodeId> {
        self.handle
            .nodes
            .iter()
            .filter(|n| n.model == population)
            .map(|n| n.id)
            .collect()
    }

    /// Ids of every unit in the layer
    pub fn all_ids(&self) -> Vec<NodeId> {
        self.handle.nodes.iter().map(|n| n.id).collect()
    }

    /// `[row, column, unit]` of each unit of a population
    pub fn locations(&self, population: &str) -> Vec<(NodeId, [usize; 3])> {
        self.handle
            .nodes
            .iter()
            .filter(|n| n.model == population)
            .map(|n| (n.id, [n.row, n.column, n.unit]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denest_kernel::InMemoryKernel;
    use denest_params::ConfigurationError;

    fn node(params: Value, kernel_params: Value) -> ResolvedNode {
        ResolvedNode {
            params: serde_json::from_value(params).unwrap(),
            kernel_params: serde_json::from_value(kernel_params).unwrap(),
        }
    }

    #[test]
    fn test_plain_layer() {
        let spec = LayerSpec::from_resolved(
            "l1",
            &node(
                json!({"populations": {"iaf_psc_alpha": 2}}),
                json!({"rows": 2, "columns": 3, "extent": [1.0, 1.0]}),
            ),
        )
        .unwrap();
        assert_eq!(spec.kind, LayerKind::Layer);
        assert_eq!(spec.geometry.locations(), 6);
        assert_eq!(spec.options.get("extent"), Some(&json!([1.0, 1.0])));
        assert!(!spec.options.contains_key("rows"));
    }

    #[test]
    fn test_elements_is_reserved() {
        let err = LayerSpec::from_resolved(
            "l1",
            &node(
                json!({"populations": {"iaf_psc_alpha": 1}}),
                json!({"rows": 1, "columns": 1, "elements": ["x"]}),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::ReservedParameter { .. })
        ));
    }

    #[test]
    fn test_input_layer_gets_relays() {
        let spec = LayerSpec::from_resolved(
            "input",
            &node(
                json!({"type": "InputLayer", "populations": {"spike_generator": 1}}),
                json!({"rows": 2, "columns": 2}),
            ),
        )
        .unwrap();
        assert_eq!(spec.population_names(), vec!["spike_generator", PARROT_MODEL]);

        let mut kernel = InMemoryKernel::new();
        let layer = LiveLayer::create(&spec, &mut kernel).unwrap();
        assert_eq!(layer.population_ids("spike_generator").len(), 4);
        assert_eq!(layer.population_ids(PARROT_MODEL).len(), 4);
        assert_eq!(kernel.connection_count(), 4);
    }

    #[test]
    fn test_input_layer_shape_rules() {
        let err = LayerSpec::from_resolved(
            "input",
            &node(
                json!({"type": "InputLayer", "populations": {"spike_generator": 2}}),
                json!({"rows": 1, "columns": 1}),
            ),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkBuildError::InvalidLayer { .. }));
    }
}
