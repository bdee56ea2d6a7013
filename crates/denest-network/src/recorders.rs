// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Recording devices.

Population recorders observe one `(layer, population)` pair. Projection
recorders observe one projection: the recorder is attached to a dedicated
copy of the projection's synapse model, which is why projection recorders are
built before connections are made.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use crate::layers::LiveLayer;
use crate::projections::ProjectionSelector;
use denest_kernel::{ConnectionRule, Kernel, NodeId, RecordingMode, Status};
use denest_params::{ResolvedParams, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What a recorder observes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecorderTarget {
    Population { layer: String, population: String },
    Projection { projection: String },
}

/// Declared recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderSpec {
    pub label: String,
    pub model: String,
    pub target: RecorderTarget,
}

impl RecorderSpec {
    pub fn population(model: &str, layer: &str, population: &str) -> Self {
        Self {
            label: format!("{}_{}_{}", model, layer, population),
            model: model.to_string(),
            target: RecorderTarget::Population {
                layer: layer.to_string(),
                population: population.to_string(),
            },
        }
    }

    pub fn projection(model: &str, projection: &str) -> Self {
        Self {
            label: format!("{}_{}", model, projection),
            model: model.to_string(),
            target: RecorderTarget::Projection {
                projection: projection.to_string(),
            },
        }
    }
}

/// A `population_recorders` entry before expansion
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PopulationRecorderEntry {
    pub model: String,
    pub layers: Vec<String>,
    /// `None` records every recordable population of each layer
    pub populations: Option<Vec<String>>,
}

impl PopulationRecorderEntry {
    pub fn schema() -> Schema {
        Schema::new()
            .mandatory("model")
            .mandatory("layers")
            .optional("populations", Value::Null)
    }

    pub fn from_params(params: &ResolvedParams) -> NetworkResult<Self> {
        let populations = match params.get("populations") {
            Some(Value::Null) | None => None,
            Some(_) => Some(params.get_str_list("populations")?),
        };
        Ok(Self {
            model: params.get_str("model")?.to_string(),
            layers: params.get_str_list("layers")?,
            populations,
        })
    }
}

/// A `projection_recorders` entry before expansion
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectionRecorderEntry {
    pub model: String,
    pub selector: ProjectionSelector,
}

impl ProjectionRecorderEntry {
    pub fn schema() -> Schema {
        ProjectionSelector::schema().mandatory("model")
    }

    pub fn from_params(params: &ResolvedParams) -> NetworkResult<Self> {
        Ok(Self {
            model: params.get_str("model")?.to_string(),
            selector: ProjectionSelector::from_params(params)?,
        })
    }
}

/// A recorder as it exists in the kernel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveRecorder {
    pub spec: RecorderSpec,
    pub id: NodeId,
    pub mode: RecordingMode,
    /// Ids of the recorded units (empty for projection recorders)
    pub targets: Vec<NodeId>,
}

impl LiveRecorder {
    pub fn label(&self) -> &str {
        &self.spec.label
    }

    fn create_device(spec: &RecorderSpec, kernel: &mut dyn Kernel) -> NetworkResult<(NodeId, RecordingMode)> {
        let info = kernel
            .model_info(&spec.model)
            .map_err(NetworkBuildError::kernel(&spec.label))?;
        let mode = info.recording_mode.ok_or_else(|| NetworkBuildError::InvalidRecorder {
            name: spec.label.clone(),
            reason: format!("`{}` is not a recorder model", spec.model),
        })?;
        let mut status = Status::new();
        status.insert("label".to_string(), json!(spec.label));
        let id = kernel
            .create_recorder(&spec.model, &status)
            .map_err(NetworkBuildError::kernel(&spec.label))?;
        Ok((id, mode))
    }

    /// Create a population recorder and wire it to its units
    pub fn create_for_population(
        spec: &RecorderSpec,
        layer: &LiveLayer,
        population: &str,
        kernel: &mut dyn Kernel,
    ) -> NetworkResult<Self> {
        let (id, mode) = Self::create_device(spec, kernel)?;
        let units = layer.population_ids(population);
        let synapse: Status = [("synapse_model".to_string(), json!("static_synapse"))]
            .into_iter()
            .collect();
        let wired = match mode {
            RecordingMode::Events => kernel.connect(&units, &[id], ConnectionRule::AllToAll, &synapse),
            RecordingMode::Sampled => kernel.connect(&[id], &units, ConnectionRule::AllToAll, &synapse),
            RecordingMode::Synaptic => {
                return Err(NetworkBuildError::InvalidRecorder {
                    name: spec.label.clone(),
                    reason: format!("`{}` records synapses and cannot target a population", spec.model),
                })
            }
        };
        wired.map_err(NetworkBuildError::kernel(&spec.label))?;
        Ok(Self {
            spec: spec.clone(),
            id,
            mode,
            targets: units,
        })
    }

    /// Create a projection recorder and the synapse model reporting to it
    ///
    /// Returns the recorder and the name of the derived synapse model, which
    /// the projection must then be connected with.
    pub fn create_for_projection(
        spec: &RecorderSpec,
        projection: &str,
        synapse_model: &str,
        kernel: &mut dyn Kernel,
    ) -> NetworkResult<(Self, String)> {
        let (id, mode) = Self::create_device(spec, kernel)?;
        if mode != RecordingMode::Synaptic {
            return Err(NetworkBuildError::InvalidRecorder {
                name: spec.label.clone(),
                reason: format!("`{}` cannot be attached to a projection", spec.model),
            });
        }
        let derived = format!("{}-{}", synapse_model, projection);
        let mut defaults = Status::new();
        defaults.insert("weight_recorder".to_string(), json!(id));
        kernel
            .copy_model(synapse_model, &derived, &defaults)
            .map_err(NetworkBuildError::kernel(&spec.label))?;
        Ok((
            Self {
                spec: spec.clone(),
                id,
                mode,
                targets: Vec::new(),
            },
            derived,
        ))
    }
}
