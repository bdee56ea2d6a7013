// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Model registry.

Every neuron, synapse and recorder model used by the network is declared as a
leaf of the `neuron_models`, `synapse_models` or `recorder_models` subtree.
A leaf names its kernel base type in `params.model`; its `kernel_params` are
the overlay passed to `copy_model`.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use denest_kernel::{ElementType, Kernel, RecordingMode, Status};
use denest_params::{ConfigurationError, ResolvedNode, Schema};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Relay model added to every input layer; may not be redeclared
pub const PARROT_MODEL: &str = "parrot_neuron";

/// Which subtree a model was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Neuron,
    Synapse,
    Recorder,
}

impl ModelKind {
    /// Subtree of `network` holding models of this kind
    pub fn group(&self) -> &'static str {
        match self {
            ModelKind::Neuron => "neuron_models",
            ModelKind::Synapse => "synapse_models",
            ModelKind::Recorder => "recorder_models",
        }
    }

    fn accepts(&self, element_type: ElementType) -> bool {
        match self {
            ModelKind::Neuron => matches!(element_type, ElementType::Neuron | ElementType::Stimulator),
            ModelKind::Synapse => element_type == ElementType::Synapse,
            ModelKind::Recorder => element_type == ElementType::Recorder,
        }
    }
}

/// Named receptor of a target neuron model, resolved to a port at build time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceptorBinding {
    pub target_neuron: String,
    pub receptor: String,
}

/// A named model derived from a kernel base type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub kind: ModelKind,
    pub base: String,
    pub params: Status,
    pub receptor: Option<ReceptorBinding>,
}

impl ModelSpec {
    /// Model spec from a resolved model leaf
    pub fn from_resolved(name: &str, kind: ModelKind, node: &ResolvedNode) -> NetworkResult<Self> {
        let mut schema = Schema::new().mandatory("model");
        if kind == ModelKind::Synapse {
            schema = schema
                .optional("receptor_type", Value::Null)
                .optional("target_neuron", Value::Null);
        }
        let params = schema.validate(name, &node.params)?;
        let base = params.get_str("model")?.to_string();

        let receptor = match (params.get_opt_str("receptor_type")?, params.get_opt_str("target_neuron")?) {
            (None, None) => None,
            (Some(receptor), Some(target_neuron)) => Some(ReceptorBinding {
                target_neuron: target_neuron.to_string(),
                receptor: receptor.to_string(),
            }),
            _ => {
                return Err(NetworkBuildError::InvalidModel {
                    name: name.to_string(),
                    reason: "`receptor_type` and `target_neuron` must be given together".to_string(),
                })
            }
        };
        if receptor.is_some() && node.kernel_params.contains_key("receptor_type") {
            return Err(ConfigurationError::ReservedParameter {
                object: name.to_string(),
                key: "receptor_type".to_string(),
            }
            .into());
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            base,
            params: node.kernel_params.clone(),
            receptor,
        })
    }
}

/// All declared models, keyed by name
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// Assemble the registry, rejecting names declared twice
    ///
    /// Names are unique across all three kinds, and [`PARROT_MODEL`] is
    /// taken.
    pub fn assemble(specs: Vec<ModelSpec>) -> NetworkResult<Self> {
        let mut models = BTreeMap::new();
        for spec in specs {
            if spec.name == PARROT_MODEL || models.contains_key(&spec.name) {
                return Err(ConfigurationError::DuplicateModel { name: spec.name }.into());
            }
            models.insert(spec.name.clone(), spec);
        }
        Ok(Self { models })
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn contains_kind(&self, name: &str, kind: ModelKind) -> bool {
        self.models.get(name).is_some_and(|m| m.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Models of one kind, sorted by name
    pub fn of_kind(&self, kind: ModelKind) -> impl Iterator<Item = &ModelSpec> {
        self.models.values().filter(move |m| m.kind == kind)
    }

    /// Kernel element type of a declared model
    pub fn element_type(&self, name: &str, kernel: &dyn Kernel) -> Option<ElementType> {
        let spec = self.models.get(name)?;
        kernel.model_info(&spec.base).ok().map(|info| info.element_type)
    }

    /// How a declared model records, `None` for anything but recorders
    pub fn recording_mode(&self, name: &str, kernel: &dyn Kernel) -> Option<RecordingMode> {
        let spec = self.models.get(name)?;
        kernel.model_info(&spec.base).ok()?.recording_mode
    }

    /// Check declared models against the kernel, without mutating it
    pub fn check_against(&self, kernel: &dyn Kernel) -> NetworkResult<()> {
        for spec in self.models.values() {
            if kernel.has_model(&spec.name) {
                return Err(ConfigurationError::DuplicateModel {
                    name: spec.name.clone(),
                }
                .into());
            }
            let info = kernel
                .model_info(&spec.base)
                .map_err(|_| NetworkBuildError::UnknownReference {
                    object: spec.name.clone(),
                    kind: "base model",
                    name: spec.base.clone(),
                })?;
            if !spec.kind.accepts(info.element_type) {
                return Err(NetworkBuildError::InvalidModel {
                    name: spec.name.clone(),
                    reason: format!(
                        "base `{}` is a {:?} model, not usable under `{}`",
                        spec.base,
                        info.element_type,
                        spec.kind.group()
                    ),
                });
            }
            if let Some(binding) = &spec.receptor {
                if !self.contains_kind(&binding.target_neuron, ModelKind::Neuron)
                    && !kernel.has_model(&binding.target_neuron)
                {
                    return Err(NetworkBuildError::UnknownReference {
                        object: spec.name.clone(),
                        kind: "neuron model",
                        name: binding.target_neuron.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Create every model of `kind` in the kernel; returns how many
    pub fn create(&self, kind: ModelKind, kernel: &mut dyn Kernel) -> NetworkResult<usize> {
        let mut created = 0;
        for spec in self.of_kind(kind) {
            let mut params = spec.params.clone();
            if let Some(binding) = &spec.receptor {
                let port = self.receptor_port(spec, binding, kernel)?;
                params.insert("receptor_type".to_string(), json!(port));
            }
            debug!(
                target: "denest-network",
                "  copy_model({} -> {}) with {} overrides",
                spec.base,
                spec.name,
                params.len()
            );
            kernel
                .copy_model(&spec.base, &spec.name, &params)
                .map_err(NetworkBuildError::kernel(&spec.name))?;
            created += 1;
        }
        Ok(created)
    }

    fn receptor_port(
        &self,
        spec: &ModelSpec,
        binding: &ReceptorBinding,
        kernel: &dyn Kernel,
    ) -> NetworkResult<u64> {
        let ports = kernel
            .receptor_types(&binding.target_neuron)
            .map_err(NetworkBuildError::kernel(&spec.name))?;
        ports
            .get(&binding.receptor)
            .copied()
            .ok_or_else(|| NetworkBuildError::InvalidModel {
                name: spec.name.clone(),
                reason: format!(
                    "`{}` has no receptor `{}` (known: {:?})",
                    binding.target_neuron,
                    binding.receptor,
                    ports.keys().collect::<Vec<_>>()
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denest_kernel::InMemoryKernel;

    fn resolved(params: Value, kernel_params: Value) -> ResolvedNode {
        ResolvedNode {
            params: serde_json::from_value(params).unwrap(),
            kernel_params: serde_json::from_value(kernel_params).unwrap(),
        }
    }

    fn neuron(name: &str) -> ModelSpec {
        ModelSpec::from_resolved(
            name,
            ModelKind::Neuron,
            &resolved(json!({"model": "ht_neuron"}), json!({"theta_eq": -50.0})),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_across_kinds() {
        let recorder = ModelSpec::from_resolved(
            "l1_exc",
            ModelKind::Recorder,
            &resolved(json!({"model": "spike_detector"}), json!({})),
        )
        .unwrap();
        let err = ModelRegistry::assemble(vec![neuron("l1_exc"), recorder]).unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::DuplicateModel { .. })
        ));
    }

    #[test]
    fn test_parrot_name_is_taken() {
        assert!(ModelRegistry::assemble(vec![neuron(PARROT_MODEL)]).is_err());
    }

    #[test]
    fn test_receptor_resolved_to_port() {
        let synapse = ModelSpec::from_resolved(
            "AMPA_syn",
            ModelKind::Synapse,
            &resolved(
                json!({"model": "ht_synapse", "receptor_type": "NMDA", "target_neuron": "ht_neuron"}),
                json!({"U": 0.4}),
            ),
        )
        .unwrap();
        let registry = ModelRegistry::assemble(vec![neuron("l1_exc"), synapse]).unwrap();
        let mut kernel = InMemoryKernel::new();
        registry.check_against(&kernel).unwrap();
        assert_eq!(registry.create(ModelKind::Neuron, &mut kernel).unwrap(), 1);
        assert_eq!(registry.create(ModelKind::Synapse, &mut kernel).unwrap(), 1);
        let info = kernel.model_info("AMPA_syn").unwrap();
        assert_eq!(info.defaults["receptor_type"], json!(2));
        assert_eq!(info.defaults["U"], json!(0.4));
    }

    #[test]
    fn test_unknown_base_and_wrong_kind() {
        let mut bad_base = neuron("x");
        bad_base.base = "no_such_model".to_string();
        let registry = ModelRegistry::assemble(vec![bad_base]).unwrap();
        assert!(matches!(
            registry.check_against(&InMemoryKernel::new()),
            Err(NetworkBuildError::UnknownReference { .. })
        ));

        let mut wrong_kind = neuron("y");
        wrong_kind.kind = ModelKind::Synapse;
        let registry = ModelRegistry::assemble(vec![wrong_kind]).unwrap();
        assert!(matches!(
            registry.check_against(&InMemoryKernel::new()),
            Err(NetworkBuildError::InvalidModel { .. })
        ));
    }

    #[test]
    fn test_missing_base_type() {
        let err = ModelSpec::from_resolved("x", ModelKind::Neuron, &resolved(json!({}), json!({})))
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::MissingParameter { .. })
        ));
    }
}
