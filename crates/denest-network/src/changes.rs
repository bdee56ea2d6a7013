// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Parameter changes applied to a live network between sessions.

A unit change selects units by layer (exact name or `*` pattern), layer type
and population; a synapse change selects the connections of projections by
name pattern or by synapse model. Each change then sets (`constant`), scales
(`multiplicative`) or shifts (`additive`) the given parameters.

A unit change with `proportion < 1` is applied to a random subset of the
selected units, drawn from the caller's seeded generator and sorted. It may
only target layers that no earlier unit change has modified.
*/

use crate::error::{ChangeError, ChangeResult};
use crate::layers::{LayerKind, LiveLayer};
use crate::live::LiveNetwork;
use denest_kernel::{ConnectionFilter, ConnectionId, Kernel, KernelError, NodeId, Status};
use denest_params::{ConfigurationError, ParamMap, Schema};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// How new parameter values are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Constant,
    Multiplicative,
    Additive,
}

impl ChangeType {
    fn parse(object: &str, raw: &str) -> ChangeResult<Self> {
        match raw {
            "constant" => Ok(ChangeType::Constant),
            "multiplicative" => Ok(ChangeType::Multiplicative),
            "additive" => Ok(ChangeType::Additive),
            other => Err(ConfigurationError::InvalidParameterValue {
                object: object.to_string(),
                key: "change_type".to_string(),
                reason: format!("expected constant, multiplicative or additive, got `{}`", other),
            }
            .into()),
        }
    }

    fn combine(&self, old: f64, operand: f64) -> f64 {
        match self {
            ChangeType::Constant => operand,
            ChangeType::Multiplicative => old * operand,
            ChangeType::Additive => old + operand,
        }
    }
}

/// Match `name` against a pattern where `*` stands for any run of characters
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !name.starts_with(first) || name.len() < first.len() + last.len() || !name.ends_with(last) {
        return false;
    }
    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(position) => rest = &rest[position + part.len()..],
            None => return false,
        }
    }
    true
}

fn map_of(object: &str, entry: &Value) -> ChangeResult<ParamMap> {
    entry
        .as_object()
        .map(|map| map.clone().into_iter().collect())
        .ok_or_else(|| {
            ConfigurationError::InvalidParameterType {
                object: object.to_string(),
                key: "<change>".to_string(),
                expected: "mapping",
            }
            .into()
        })
}

fn params_of(object: &str, value: &Value) -> ChangeResult<Status> {
    value
        .as_object()
        .map(|map| map.clone().into_iter().collect())
        .ok_or_else(|| ConfigurationError::InvalidParameterType {
            object: object.to_string(),
            key: "params".to_string(),
            expected: "mapping",
        }
        .into())
}

/// Change applied to the units of one or more populations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitChange {
    /// Position in the session's list, used in messages
    pub label: String,
    pub layer: Option<String>,
    pub layer_type: Option<LayerKind>,
    pub population: Option<String>,
    pub change_type: ChangeType,
    pub proportion: f64,
    pub params: Status,
}

impl UnitChange {
    pub fn schema() -> Schema {
        Schema::new()
            .mandatory("params")
            .optional("layer", Value::Null)
            .optional("layer_type", Value::Null)
            .optional("population", Value::Null)
            .optional("change_type", "constant")
            .optional("proportion", 1.0)
    }

    pub fn from_value(label: &str, entry: &Value) -> ChangeResult<Self> {
        let params = Self::schema().validate(label, &map_of(label, entry)?)?;
        let layer_type = match params.get_opt_str("layer_type")? {
            None => None,
            Some("layer") => Some(LayerKind::Layer),
            Some("input_layer") => Some(LayerKind::InputLayer),
            Some(other) => {
                return Err(ConfigurationError::InvalidParameterValue {
                    object: label.to_string(),
                    key: "layer_type".to_string(),
                    reason: format!("expected `layer` or `input_layer`, got `{}`", other),
                }
                .into())
            }
        };
        let proportion = params.get_f64("proportion")?;
        if !(0.0..=1.0).contains(&proportion) {
            return Err(ConfigurationError::InvalidParameterValue {
                object: label.to_string(),
                key: "proportion".to_string(),
                reason: format!("must lie in [0, 1], got {}", proportion),
            }
            .into());
        }
        Ok(Self {
            label: label.to_string(),
            layer: params.get_opt_str("layer")?.map(str::to_string),
            layer_type,
            population: params.get_opt_str("population")?.map(str::to_string),
            change_type: ChangeType::parse(label, params.get_str("change_type")?)?,
            proportion,
            params: params_of(label, params.require("params")?)?,
        })
    }

    pub fn is_proportional(&self) -> bool {
        self.proportion < 1.0
    }

    fn selects_layer(&self, layer: &LiveLayer) -> bool {
        self.layer
            .as_ref()
            .map_or(true, |pattern| matches_pattern(pattern, layer.name()))
            && self.layer_type.map_or(true, |kind| kind == layer.kind())
    }

    fn layer_ids(&self, layer: &LiveLayer) -> Vec<NodeId> {
        match &self.population {
            Some(population) => layer.population_ids(population),
            None => layer.all_ids(),
        }
    }

    /// Selected units, sorted, before any proportional subsampling
    pub fn select(&self, network: &LiveNetwork) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = network
            .layers()
            .filter(|layer| self.selects_layer(layer))
            .flat_map(|layer| self.layer_ids(layer))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Names of the layers with at least one selected unit
    pub fn selected_layers(&self, network: &LiveNetwork) -> Vec<String> {
        network
            .layers()
            .filter(|layer| self.selects_layer(layer) && !self.layer_ids(layer).is_empty())
            .map(|layer| layer.name().to_string())
            .collect()
    }

    /// First selected layer that an earlier unit change already modified
    ///
    /// A proportional change is only allowed on layers no unit change has
    /// touched yet in this run.
    pub fn conflicting_layer(&self, network: &LiveNetwork) -> Option<String> {
        if !self.is_proportional() {
            return None;
        }
        self.selected_layers(network)
            .into_iter()
            .find(|layer| network.layer_changed(layer))
    }

    /// Apply the change; returns the number of units changed
    pub fn apply(
        &self,
        kernel: &mut dyn Kernel,
        network: &mut LiveNetwork,
        rng: &mut ChaCha8Rng,
    ) -> ChangeResult<usize> {
        let mut ids = self.select(network);
        if ids.is_empty() {
            return Err(ChangeError::NoTargets {
                change: self.label.clone(),
            });
        }
        if let Some(layer) = self.conflicting_layer(network) {
            return Err(ChangeError::InvalidChange {
                change: self.label.clone(),
                reason: format!("layer `{}` was already changed; proportional changes must come first", layer),
            });
        }
        let layers = self.selected_layers(network);
        if self.is_proportional() {
            // rounds down, so a proportion never selects more units than it names
            let keep = (self.proportion * ids.len() as f64).floor() as usize;
            let mut chosen: Vec<NodeId> = sample(rng, ids.len(), keep)
                .into_iter()
                .map(|index| ids[index])
                .collect();
            chosen.sort_unstable();
            ids = chosen;
        }
        debug!(
            target: "denest-network",
            "  {} change `{}` on {} units: {:?}",
            format!("{:?}", self.change_type).to_lowercase(),
            self.label,
            ids.len(),
            self.params.keys().collect::<Vec<_>>()
        );

        let kernel_err = |source: KernelError| ChangeError::Kernel {
            change: self.label.clone(),
            source,
        };
        for (key, value) in &self.params {
            match (self.change_type, value) {
                (ChangeType::Constant, Value::Array(values))
                    if Self::is_per_unit(&*kernel, &ids, key, values) =>
                {
                    for (id, value) in ids.iter().zip(values) {
                        let status: Status = [(key.clone(), value.clone())].into_iter().collect();
                        kernel.set_status(&[*id], &status).map_err(kernel_err)?;
                    }
                }
                (ChangeType::Constant, _) => {
                    let status: Status = [(key.clone(), value.clone())].into_iter().collect();
                    kernel.set_status(&ids, &status).map_err(kernel_err)?;
                }
                (change_type, value) => {
                    let operand = self.operand(key, value)?;
                    for id in &ids {
                        let old = kernel.get_status(*id, key).map_err(kernel_err)?;
                        let old = self.number(key, &old)?;
                        let status: Status = [(key.clone(), json!(change_type.combine(old, operand)))]
                            .into_iter()
                            .collect();
                        kernel.set_status(&[*id], &status).map_err(kernel_err)?;
                    }
                }
            }
        }
        network.mark_changed(layers);
        Ok(ids.len())
    }

    /// Whether an array value holds one entry per unit rather than one list
    /// for every unit
    ///
    /// Entries are per-unit only when there is one per unit and each has the
    /// shape of the parameter's current value: a list parameter such as
    /// `spike_times` takes a list of lists, a scalar parameter a list of
    /// scalars. Unknown keys fall through to a plain `set_status`, which
    /// reports them.
    fn is_per_unit(kernel: &dyn Kernel, ids: &[NodeId], key: &str, values: &[Value]) -> bool {
        values.len() == ids.len()
            && ids.iter().zip(values).all(|(id, value)| {
                kernel
                    .get_status(*id, key)
                    .map_or(false, |current| current.is_array() == value.is_array())
            })
    }

    fn operand(&self, key: &str, value: &Value) -> ChangeResult<f64> {
        value.as_f64().ok_or_else(|| ChangeError::InvalidChange {
            change: self.label.clone(),
            reason: format!("`{}` needs a numeric operand, got {}", key, value),
        })
    }

    fn number(&self, key: &str, value: &Value) -> ChangeResult<f64> {
        value.as_f64().ok_or_else(|| ChangeError::InvalidChange {
            change: self.label.clone(),
            reason: format!("current value of `{}` is not numeric: {}", key, value),
        })
    }
}

/// Change applied to the connections of one or more projections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynapseChange {
    pub label: String,
    pub projection: Option<String>,
    pub synapse_model: Option<String>,
    pub change_type: ChangeType,
    pub params: Status,
}

impl SynapseChange {
    pub fn schema() -> Schema {
        Schema::new()
            .mandatory("params")
            .optional("projection", Value::Null)
            .optional("synapse_model", Value::Null)
            .optional("change_type", "constant")
    }

    pub fn from_value(label: &str, entry: &Value) -> ChangeResult<Self> {
        let params = Self::schema().validate(label, &map_of(label, entry)?)?;
        let projection = params.get_opt_str("projection")?.map(str::to_string);
        let synapse_model = params.get_opt_str("synapse_model")?.map(str::to_string);
        if projection.is_none() && synapse_model.is_none() {
            return Err(ConfigurationError::MissingParameter {
                object: label.to_string(),
                key: "projection".to_string(),
            }
            .into());
        }
        Ok(Self {
            label: label.to_string(),
            projection,
            synapse_model,
            change_type: ChangeType::parse(label, params.get_str("change_type")?)?,
            params: params_of(label, params.require("params")?)?,
        })
    }

    /// Connections of every selected projection
    pub fn select(&self, kernel: &dyn Kernel, network: &LiveNetwork) -> ChangeResult<Vec<ConnectionId>> {
        let mut connections = Vec::new();
        for projection in network.projections() {
            if let Some(pattern) = &self.projection {
                if !matches_pattern(pattern, &projection.spec.name) {
                    continue;
                }
            }
            if let Some(model) = &self.synapse_model {
                let declared = network
                    .spec()
                    .projection_models
                    .get(&projection.spec.model)
                    .map(|m| m.synapse_model.as_str());
                if declared != Some(model.as_str()) && projection.synapse_model != *model {
                    continue;
                }
            }
            let (Some(source_layer), Some(target_layer)) = (
                network.layer(&projection.spec.source_layer),
                network.layer(&projection.spec.target_layer),
            ) else {
                continue;
            };
            let filter = ConnectionFilter {
                synapse_model: Some(projection.synapse_model.clone()),
                sources: Some(source_layer.population_ids(&projection.spec.source_population)),
                targets: Some(target_layer.population_ids(&projection.spec.target_population)),
            };
            connections.extend(kernel.get_connections(&filter).map_err(|source| ChangeError::Kernel {
                change: self.label.clone(),
                source,
            })?);
        }
        connections.sort_unstable();
        connections.dedup();
        Ok(connections)
    }

    /// Apply the change; returns the number of connections changed
    pub fn apply(&self, kernel: &mut dyn Kernel, network: &LiveNetwork) -> ChangeResult<usize> {
        let connections = self.select(&*kernel, network)?;
        if connections.is_empty() {
            return Err(ChangeError::NoTargets {
                change: self.label.clone(),
            });
        }
        debug!(
            target: "denest-network",
            "  synapse change `{}` on {} connections",
            self.label,
            connections.len()
        );
        let kernel_err = |source: KernelError| ChangeError::Kernel {
            change: self.label.clone(),
            source,
        };
        if self.change_type == ChangeType::Constant {
            kernel
                .set_connection_status(&connections, &self.params)
                .map_err(kernel_err)?;
            return Ok(connections.len());
        }
        for (key, value) in &self.params {
            let operand = value.as_f64().ok_or_else(|| ChangeError::InvalidChange {
                change: self.label.clone(),
                reason: format!("`{}` needs a numeric operand, got {}", key, value),
            })?;
            for connection in &connections {
                let old = kernel
                    .get_connection_status(*connection, key)
                    .map_err(kernel_err)?;
                let old = old.as_f64().ok_or_else(|| ChangeError::InvalidChange {
                    change: self.label.clone(),
                    reason: format!("current value of `{}` is not numeric: {}", key, old),
                })?;
                let status: Status = [(key.clone(), json!(self.change_type.combine(old, operand)))]
                    .into_iter()
                    .collect();
                kernel
                    .set_connection_status(&[*connection], &status)
                    .map_err(kernel_err)?;
            }
        }
        Ok(connections.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("l1", "l1"));
        assert!(!matches_pattern("l1", "l12"));
        assert!(matches_pattern("l*", "l12"));
        assert!(matches_pattern("*_exc", "l1_exc"));
        assert!(matches_pattern("l*_*c", "l1_exc"));
        assert!(!matches_pattern("l*_inh", "l1_exc"));
        assert!(matches_pattern("*", ""));
        assert!(!matches_pattern("ab*ba", "aba"));
    }

    #[test]
    fn test_unit_change_defaults() {
        let change = UnitChange::from_value("c0", &json!({"layer": "l1", "params": {"V_m": -60.0}})).unwrap();
        assert_eq!(change.change_type, ChangeType::Constant);
        assert_eq!(change.proportion, 1.0);
        assert!(!change.is_proportional());
    }

    #[test]
    fn test_unit_change_rejects_unknown_keys() {
        let err = UnitChange::from_value("c0", &json!({"layers": "l1", "params": {}})).unwrap_err();
        assert!(matches!(
            err,
            ChangeError::Configuration(ConfigurationError::UnrecognizedParameter { .. })
        ));
        let err = UnitChange::from_value("c0", &json!({"params": {}, "change_type": "divide"})).unwrap_err();
        assert!(matches!(
            err,
            ChangeError::Configuration(ConfigurationError::InvalidParameterValue { .. })
        ));
    }

    #[test]
    fn test_synapse_change_needs_selector() {
        assert!(SynapseChange::from_value("s0", &json!({"params": {"weight": 1.0}})).is_err());
        let change =
            SynapseChange::from_value("s0", &json!({"synapse_model": "AMPA", "params": {"weight": 1.0}})).unwrap();
        assert_eq!(change.synapse_model.as_deref(), Some("AMPA"));
    }

    #[test]
    fn test_combine() {
        assert_eq!(ChangeType::Multiplicative.combine(2.0, 3.0), 6.0);
        assert_eq!(ChangeType::Additive.combine(2.0, 3.0), 5.0);
        assert_eq!(ChangeType::Constant.combine(2.0, 3.0), 3.0);
    }
}
