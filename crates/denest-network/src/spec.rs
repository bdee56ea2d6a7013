// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Network specification assembled from the `network` subtree.

```text
network/
  neuron_models/...     leaves: params.model + kernel_params overlay
  synapse_models/...
  recorder_models/...
  layers/...            leaves: params.populations, params.type, kernel_params.rows/columns
  projection_models/... leaves: params.type, kernel_params connection rule
  topology              params.projections
  recorders             params.population_recorders, params.projection_recorders
```

Model and layer leaves may be grouped under intermediate nodes; only the
leaf name counts.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use crate::layers::{LayerKind, LayerSpec};
use crate::models::{ModelKind, ModelRegistry, ModelSpec, PARROT_MODEL};
use crate::projections::{list_entries, ProjectionModel, ProjectionSelector, ProjectionSpec};
use crate::recorders::{PopulationRecorderEntry, ProjectionRecorderEntry, RecorderSpec, RecorderTarget};
use denest_kernel::{ElementType, Kernel, RecordingMode};
use denest_params::{ConfigurationError, NodePath, ParamTree, ResolvedNode, Schema, TreeMerger};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Children allowed under `network`
pub const NETWORK_CHILDREN: &[&str] = &[
    "layers",
    "neuron_models",
    "projection_models",
    "recorder_models",
    "recorders",
    "synapse_models",
    "topology",
];

/// Every spec needed to build the network, in declaration form
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkSpec {
    pub models: ModelRegistry,
    pub layers: BTreeMap<String, LayerSpec>,
    pub projection_models: BTreeMap<String, ProjectionModel>,
    /// In topology order
    pub projections: Vec<ProjectionSpec>,
    /// In declaration order
    pub population_recorders: Vec<RecorderSpec>,
    /// In declaration order
    pub projection_recorders: Vec<RecorderSpec>,
}

fn leaves_by_name(
    merger: &mut TreeMerger<'_>,
    under: &NodePath,
) -> NetworkResult<Vec<(String, Arc<ResolvedNode>)>> {
    if !merger.tree().contains(under) {
        return Ok(Vec::new());
    }
    Ok(merger
        .resolve_leaves(under)?
        .into_iter()
        .map(|(path, node)| (path.name().to_string(), node))
        .collect())
}

impl NetworkSpec {
    /// Assemble the spec from the `network` node of a tree
    pub fn from_tree(tree: &ParamTree, network: &NodePath) -> NetworkResult<Self> {
        for child in tree.child_names(network) {
            if !NETWORK_CHILDREN.contains(&child.as_str()) {
                return Err(ConfigurationError::UnrecognizedChild {
                    object: network.to_string(),
                    child,
                }
                .into());
            }
        }
        let mut merger = TreeMerger::new(tree);

        let mut model_specs = Vec::new();
        for kind in [ModelKind::Neuron, ModelKind::Synapse, ModelKind::Recorder] {
            for (name, node) in leaves_by_name(&mut merger, &network.child(kind.group()))? {
                model_specs.push(ModelSpec::from_resolved(&name, kind, &node)?);
            }
        }
        let models = ModelRegistry::assemble(model_specs)?;

        let mut layers = BTreeMap::new();
        for (name, node) in leaves_by_name(&mut merger, &network.child("layers"))? {
            let spec = LayerSpec::from_resolved(&name, &node)?;
            if layers.insert(name.clone(), spec).is_some() {
                return Err(NetworkBuildError::DuplicateLayer(name));
            }
        }

        let mut projection_models = BTreeMap::new();
        for (name, node) in leaves_by_name(&mut merger, &network.child("projection_models"))? {
            let model = ProjectionModel::from_resolved(&name, &node)?;
            if projection_models.insert(name.clone(), model).is_some() {
                return Err(NetworkBuildError::DuplicateProjection(name));
            }
        }

        let topology_path = network.child("topology");
        let mut projections = Vec::new();
        if tree.contains(&topology_path) {
            let object = topology_path.to_string();
            let node = merger.resolve(&topology_path)?;
            let params = Schema::new()
                .optional("projections", serde_json::json!([]))
                .validate(&object, &node.params)?;
            let mut seen = BTreeSet::new();
            for (label, entry) in list_entries(&object, "projections", params.get_list("projections")?)? {
                let entry = ProjectionSelector::schema().validate(&label, &entry)?;
                for spec in ProjectionSelector::from_params(&entry)?.expand() {
                    if !seen.insert(spec.name.clone()) {
                        return Err(NetworkBuildError::DuplicateProjection(spec.name));
                    }
                    projections.push(spec);
                }
            }
        }

        let recorders_path = network.child("recorders");
        let mut population_recorders = Vec::new();
        let mut projection_recorders = Vec::new();
        if tree.contains(&recorders_path) {
            let object = recorders_path.to_string();
            let node = merger.resolve(&recorders_path)?;
            let params = Schema::new()
                .optional("population_recorders", serde_json::json!([]))
                .optional("projection_recorders", serde_json::json!([]))
                .validate(&object, &node.params)?;

            let entries = params.get_list("population_recorders")?;
            for (label, entry) in list_entries(&object, "population_recorders", entries)? {
                let entry = PopulationRecorderEntry::schema().validate(&label, &entry)?;
                let entry = PopulationRecorderEntry::from_params(&entry)?;
                for layer_name in &entry.layers {
                    let populations = match (&entry.populations, layers.get(layer_name)) {
                        (Some(populations), _) => populations.clone(),
                        (None, Some(layer)) => recordable_populations(layer),
                        (None, None) => {
                            return Err(NetworkBuildError::UnknownReference {
                                object: label.clone(),
                                kind: "layer",
                                name: layer_name.clone(),
                            })
                        }
                    };
                    for population in populations {
                        population_recorders.push(RecorderSpec::population(&entry.model, layer_name, &population));
                    }
                }
            }

            let entries = params.get_list("projection_recorders")?;
            for (label, entry) in list_entries(&object, "projection_recorders", entries)? {
                let entry = ProjectionRecorderEntry::schema().validate(&label, &entry)?;
                let entry = ProjectionRecorderEntry::from_params(&entry)?;
                for projection in entry.selector.expand() {
                    projection_recorders.push(RecorderSpec::projection(&entry.model, &projection.name));
                }
            }
        }

        debug!(
            target: "denest-network",
            "Network spec: {} models, {} layers, {} projections, {} recorders",
            models.len(),
            layers.len(),
            projections.len(),
            population_recorders.len() + projection_recorders.len()
        );

        Ok(Self {
            models,
            layers,
            projection_models,
            projections,
            population_recorders,
            projection_recorders,
        })
    }

    /// Check every name reference against the declared specs
    ///
    /// Reads the kernel's model table but never mutates the kernel.
    pub fn validate_references(&self, kernel: &dyn Kernel) -> NetworkResult<()> {
        self.models.check_against(kernel)?;

        for layer in self.layers.values() {
            for (model, _) in &layer.populations {
                if !self.models.contains_kind(model, ModelKind::Neuron) {
                    return Err(NetworkBuildError::UnknownReference {
                        object: layer.name.clone(),
                        kind: "neuron model",
                        name: model.clone(),
                    });
                }
                let element_type = self.models.element_type(model, kernel);
                let is_stimulator = element_type == Some(ElementType::Stimulator);
                if is_stimulator != (layer.kind == LayerKind::InputLayer) {
                    return Err(NetworkBuildError::InvalidLayer {
                        name: layer.name.clone(),
                        reason: format!(
                            "population `{}`: stimulation devices belong in input layers, and only there",
                            model
                        ),
                    });
                }
            }
        }

        for model in self.projection_models.values() {
            if !self.models.contains_kind(&model.synapse_model, ModelKind::Synapse) {
                return Err(NetworkBuildError::UnknownReference {
                    object: model.name.clone(),
                    kind: "synapse model",
                    name: model.synapse_model.clone(),
                });
            }
        }

        for projection in &self.projections {
            self.check_projection(projection)?;
        }

        let declared: BTreeSet<&str> = self.projections.iter().map(|p| p.name.as_str()).collect();
        let mut recorded = BTreeSet::new();
        for recorder in &self.population_recorders {
            self.check_recorder_model(recorder, kernel)?;
            if let RecorderTarget::Population { layer, population } = &recorder.target {
                let spec = self.layer(&recorder.label, layer)?;
                if !spec.has_population(population) {
                    return Err(NetworkBuildError::UnknownReference {
                        object: recorder.label.clone(),
                        kind: "population",
                        name: format!("{}/{}", layer, population),
                    });
                }
            }
        }
        for recorder in &self.projection_recorders {
            self.check_recorder_model(recorder, kernel)?;
            if let RecorderTarget::Projection { projection } = &recorder.target {
                if !declared.contains(projection.as_str()) {
                    return Err(NetworkBuildError::UnknownReference {
                        object: recorder.label.clone(),
                        kind: "projection",
                        name: projection.clone(),
                    });
                }
                if !recorded.insert(projection.clone()) {
                    return Err(NetworkBuildError::InvalidRecorder {
                        name: recorder.label.clone(),
                        reason: format!("projection `{}` already has a recorder", projection),
                    });
                }
            }
        }
        Ok(())
    }

    fn layer(&self, object: &str, name: &str) -> NetworkResult<&LayerSpec> {
        self.layers
            .get(name)
            .ok_or_else(|| NetworkBuildError::UnknownReference {
                object: object.to_string(),
                kind: "layer",
                name: name.to_string(),
            })
    }

    fn check_projection(&self, projection: &ProjectionSpec) -> NetworkResult<()> {
        if !self.projection_models.contains_key(&projection.model) {
            return Err(NetworkBuildError::UnknownReference {
                object: projection.name.clone(),
                kind: "projection model",
                name: projection.model.clone(),
            });
        }
        let source = self.layer(&projection.name, &projection.source_layer)?;
        let target = self.layer(&projection.name, &projection.target_layer)?;
        for (layer, population) in [
            (source, &projection.source_population),
            (target, &projection.target_population),
        ] {
            if !layer.has_population(population) {
                return Err(NetworkBuildError::UnknownReference {
                    object: projection.name.clone(),
                    kind: "population",
                    name: format!("{}/{}", layer.name, population),
                });
            }
        }
        if target.kind == LayerKind::InputLayer {
            return Err(NetworkBuildError::InvalidProjection {
                name: projection.name.clone(),
                reason: format!("input layer `{}` cannot be a projection target", target.name),
            });
        }
        if source.kind == LayerKind::InputLayer && projection.source_population != PARROT_MODEL {
            return Err(NetworkBuildError::InvalidProjection {
                name: projection.name.clone(),
                reason: format!(
                    "projections out of input layer `{}` must start from `{}`",
                    source.name, PARROT_MODEL
                ),
            });
        }
        Ok(())
    }

    /// The recorder's model must be a declared recorder whose recording mode
    /// fits its target: spikes or samples for populations, synapses for
    /// projections.
    fn check_recorder_model(&self, recorder: &RecorderSpec, kernel: &dyn Kernel) -> NetworkResult<()> {
        if !self.models.contains_kind(&recorder.model, ModelKind::Recorder) {
            return Err(NetworkBuildError::UnknownReference {
                object: recorder.label.clone(),
                kind: "recorder model",
                name: recorder.model.clone(),
            });
        }
        let invalid = |reason: String| NetworkBuildError::InvalidRecorder {
            name: recorder.label.clone(),
            reason,
        };
        let mode = self
            .models
            .recording_mode(&recorder.model, kernel)
            .ok_or_else(|| invalid(format!("`{}` is not a recorder model", recorder.model)))?;
        match (&recorder.target, mode) {
            (RecorderTarget::Population { .. }, RecordingMode::Synaptic) => Err(invalid(format!(
                "`{}` records synapses and cannot target a population",
                recorder.model
            ))),
            (RecorderTarget::Projection { .. }, RecordingMode::Events | RecordingMode::Sampled) => Err(invalid(
                format!("`{}` cannot be attached to a projection", recorder.model),
            )),
            _ => Ok(()),
        }
    }
}

/// Populations a recorder with no explicit list observes
///
/// Stimulation devices are not recordable, so input layers contribute their
/// relay population only.
fn recordable_populations(layer: &LayerSpec) -> Vec<String> {
    match layer.kind {
        LayerKind::Layer => layer.populations.iter().map(|(m, _)| m.clone()).collect(),
        LayerKind::InputLayer => vec![PARROT_MODEL.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denest_kernel::InMemoryKernel;
    use denest_params::tree_from_value;
    use serde_json::json;

    fn tree(network: serde_json::Value) -> ParamTree {
        tree_from_value(&json!({ "network": network }), "test").unwrap()
    }

    fn small_network() -> serde_json::Value {
        json!({
            "neuron_models": {
                "my_neuron": {"params": {"model": "iaf_psc_alpha"}},
                "input_exc": {"params": {"model": "spike_generator"}}
            },
            "synapse_models": {
                "my_synapse": {"params": {"model": "static_synapse"}, "kernel_params": {"weight": 2.0}}
            },
            "recorder_models": {
                "my_detector": {"params": {"model": "spike_detector"}}
            },
            "layers": {
                "input_layer": {
                    "params": {"type": "InputLayer", "populations": {"input_exc": 1}},
                    "kernel_params": {"rows": 2, "columns": 2}
                },
                "l1": {
                    "params": {"populations": {"my_neuron": 2}},
                    "kernel_params": {"rows": 2, "columns": 2}
                }
            },
            "projection_models": {
                "proj": {
                    "kernel_params": {"synapse_model": "my_synapse", "connection_type": "divergent"}
                }
            },
            "topology": {
                "params": {"projections": [{
                    "projection_model": "proj",
                    "source_layers": ["input_layer"],
                    "source_population": "parrot_neuron",
                    "target_layers": ["l1"],
                    "target_population": "my_neuron"
                }]}
            },
            "recorders": {
                "params": {"population_recorders": [{"model": "my_detector", "layers": ["l1", "input_layer"]}]}
            }
        })
    }

    #[test]
    fn test_small_network_spec() {
        let spec = NetworkSpec::from_tree(&tree(small_network()), &NodePath::parse("network")).unwrap();
        assert_eq!(spec.models.len(), 4);
        assert_eq!(spec.layers.len(), 2);
        assert_eq!(spec.projections[0].name, "proj-input_layer-parrot_neuron-l1-my_neuron");
        let labels: Vec<&str> = spec.population_recorders.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["my_detector_l1_my_neuron", "my_detector_input_layer_parrot_neuron"]
        );
        spec.validate_references(&InMemoryKernel::new()).unwrap();
    }

    #[test]
    fn test_layer_referencing_undeclared_model() {
        let mut network = small_network();
        network["layers"]["l1"]["params"]["populations"] = json!({"nobody": 1});
        let spec = NetworkSpec::from_tree(&tree(network), &NodePath::parse("network")).unwrap();
        assert!(matches!(
            spec.validate_references(&InMemoryKernel::new()),
            Err(NetworkBuildError::UnknownReference { kind: "neuron model", .. })
        ));
    }

    #[test]
    fn test_input_layer_cannot_be_target() {
        let mut network = small_network();
        network["topology"]["params"]["projections"][0]["target_layers"] = json!(["input_layer"]);
        network["topology"]["params"]["projections"][0]["target_population"] = json!("parrot_neuron");
        let spec = NetworkSpec::from_tree(&tree(network), &NodePath::parse("network")).unwrap();
        assert!(matches!(
            spec.validate_references(&InMemoryKernel::new()),
            Err(NetworkBuildError::InvalidProjection { .. })
        ));
    }

    #[test]
    fn test_synaptic_recorder_cannot_target_population() {
        let mut network = small_network();
        network["recorder_models"]["my_detector"]["params"]["model"] = json!("weight_recorder");
        let spec = NetworkSpec::from_tree(&tree(network), &NodePath::parse("network")).unwrap();
        assert!(matches!(
            spec.validate_references(&InMemoryKernel::new()),
            Err(NetworkBuildError::InvalidRecorder { ref name, .. }) if name == "my_detector_l1_my_neuron"
        ));
    }

    #[test]
    fn test_unrecognized_network_child() {
        let mut network = small_network();
        network["extras"] = json!({"params": {}});
        let err = NetworkSpec::from_tree(&tree(network), &NodePath::parse("network")).unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::UnrecognizedChild { .. })
        ));
    }

    #[test]
    fn test_grouped_model_leaves_inherit_group_params() {
        let mut network = small_network();
        network["synapse_models"] = json!({
            "params": {"model": "static_synapse"},
            "my_synapse": {"kernel_params": {"weight": 3.0}}
        });
        let spec = NetworkSpec::from_tree(&tree(network), &NodePath::parse("network")).unwrap();
        let synapse = spec.models.get("my_synapse").unwrap();
        assert_eq!(synapse.base, "static_synapse");
        assert_eq!(synapse.params["weight"], json!(3.0));
    }
}
