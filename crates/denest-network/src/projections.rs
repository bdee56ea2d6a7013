// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Projection models and projections.

A projection model (a leaf of `projection_models`) fixes the connection rule
and the synapse model. The `topology` node lists which layer pairs are
connected by which projection model; each entry expands to one projection per
(source layer, target layer) pair.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use crate::layers::LiveLayer;
use denest_kernel::{ConnectionRule, Kernel, NodeId, Status};
use denest_params::{ConfigurationError, ParamMap, ResolvedNode, Schema};
use serde::Serialize;
use serde_json::{json, Value};

/// How a projection model connects units
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Kernel-side topological rule; the status is passed to `connect_layers`
    Topological { spec: Status },
    /// Explicit `[source_index, target_index]` pairs into the population unit lists
    Explicit { pairs: Vec<(usize, usize)>, synapse: Status },
}

/// Declared projection model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionModel {
    pub name: String,
    pub synapse_model: String,
    pub kind: ConnectionKind,
}

impl ProjectionModel {
    pub fn from_resolved(name: &str, node: &ResolvedNode) -> NetworkResult<Self> {
        let params = Schema::new()
            .optional("type", "topological")
            .optional("pairs", Value::Null)
            .validate(name, &node.params)?;
        let kind_name = params.get_str("type")?;
        let mut kernel_schema = Schema::open()
            .mandatory("synapse_model")
            .reserved("sources")
            .reserved("targets");
        if kind_name == "topological" {
            kernel_schema = kernel_schema.mandatory("connection_type");
        }
        let kernel_params = kernel_schema.validate(name, &node.kernel_params)?;
        let synapse_model = kernel_params.get_str("synapse_model")?.to_string();

        let kind = match kind_name {
            "topological" => {
                if !params.get("pairs").is_some_and(Value::is_null) {
                    return Err(ConfigurationError::UnrecognizedParameter {
                        object: name.to_string(),
                        key: "pairs".to_string(),
                    }
                    .into());
                }
                ConnectionKind::Topological {
                    spec: kernel_params.as_map().clone(),
                }
            }
            "explicit" => {
                let pairs = parse_pairs(name, params.get("pairs"))?;
                let mut synapse = kernel_params.as_map().clone();
                synapse.remove("synapse_model");
                ConnectionKind::Explicit { pairs, synapse }
            }
            other => {
                return Err(NetworkBuildError::InvalidProjection {
                    name: name.to_string(),
                    reason: format!("unknown projection type `{}`", other),
                })
            }
        };

        Ok(Self {
            name: name.to_string(),
            synapse_model,
            kind,
        })
    }
}

fn parse_pairs(name: &str, raw: Option<&Value>) -> NetworkResult<Vec<(usize, usize)>> {
    let invalid = |reason: &str| NetworkBuildError::InvalidProjection {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let list = raw
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("explicit projections need a `pairs` list"))?;
    list.iter()
        .map(|pair| {
            let pair = pair.as_array().filter(|p| p.len() == 2);
            match pair.map(|p| (p[0].as_u64(), p[1].as_u64())) {
                Some((Some(source), Some(target))) => Ok((source as usize, target as usize)),
                _ => Err(invalid("each pair must be [source_index, target_index]")),
            }
        })
        .collect()
}

/// One connected (source, target) population pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionSpec {
    pub name: String,
    pub model: String,
    pub source_layer: String,
    pub source_population: String,
    pub target_layer: String,
    pub target_population: String,
}

impl ProjectionSpec {
    pub fn new(
        model: &str,
        source_layer: &str,
        source_population: &str,
        target_layer: &str,
        target_population: &str,
    ) -> Self {
        Self {
            name: projection_name(model, source_layer, source_population, target_layer, target_population),
            model: model.to_string(),
            source_layer: source_layer.to_string(),
            source_population: source_population.to_string(),
            target_layer: target_layer.to_string(),
            target_population: target_population.to_string(),
        }
    }
}

/// `model-source_layer-source_population-target_layer-target_population`
pub fn projection_name(
    model: &str,
    source_layer: &str,
    source_population: &str,
    target_layer: &str,
    target_population: &str,
) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        model, source_layer, source_population, target_layer, target_population
    )
}

/// Fields shared by topology entries and projection recorder entries
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectionSelector {
    pub projection_model: String,
    pub source_layers: Vec<String>,
    pub source_population: String,
    pub target_layers: Vec<String>,
    pub target_population: String,
}

impl ProjectionSelector {
    pub fn schema() -> Schema {
        Schema::new()
            .mandatory("projection_model")
            .mandatory("source_layers")
            .mandatory("source_population")
            .mandatory("target_layers")
            .mandatory("target_population")
    }

    pub fn from_params(params: &denest_params::ResolvedParams) -> NetworkResult<Self> {
        Ok(Self {
            projection_model: params.get_str("projection_model")?.to_string(),
            source_layers: params.get_str_list("source_layers")?,
            source_population: params.get_str("source_population")?.to_string(),
            target_layers: params.get_str_list("target_layers")?,
            target_population: params.get_str("target_population")?.to_string(),
        })
    }

    /// One projection per (source layer, target layer) pair, in list order
    pub fn expand(&self) -> Vec<ProjectionSpec> {
        let mut specs = Vec::new();
        for source in &self.source_layers {
            for target in &self.target_layers {
                specs.push(ProjectionSpec::new(
                    &self.projection_model,
                    source,
                    &self.source_population,
                    target,
                    &self.target_population,
                ));
            }
        }
        specs
    }
}

/// Entries of a list-valued parameter as parameter maps
pub(crate) fn list_entries(object: &str, key: &str, list: &[Value]) -> NetworkResult<Vec<(String, ParamMap)>> {
    list.iter()
        .enumerate()
        .map(|(index, entry)| {
            let label = format!("{}/{}[{}]", object, key, index);
            match entry {
                Value::Object(map) => Ok((label, map.clone().into_iter().collect())),
                _ => Err(ConfigurationError::InvalidParameterType {
                    object: object.to_string(),
                    key: key.to_string(),
                    expected: "list of mappings",
                }
                .into()),
            }
        })
        .collect()
}

/// A projection as it exists in the kernel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveProjection {
    pub spec: ProjectionSpec,
    /// Synapse model actually used; differs from the projection model's
    /// when a projection recorder is attached
    pub synapse_model: String,
    pub connections: usize,
}

impl LiveProjection {
    /// Connect the two populations
    pub fn create(
        spec: &ProjectionSpec,
        model: &ProjectionModel,
        synapse_model: &str,
        source: &LiveLayer,
        target: &LiveLayer,
        kernel: &mut dyn Kernel,
    ) -> NetworkResult<Self> {
        let connections = match &model.kind {
            ConnectionKind::Topological { spec: connection } => {
                let mut connection = connection.clone();
                connection.insert("synapse_model".to_string(), json!(synapse_model));
                connection.insert("sources".to_string(), json!({"model": spec.source_population}));
                connection.insert("targets".to_string(), json!({"model": spec.target_population}));
                kernel
                    .connect_layers(source.handle.id, target.handle.id, &connection)
                    .map_err(NetworkBuildError::kernel(&spec.name))?
            }
            ConnectionKind::Explicit { pairs, synapse } => {
                let sources = source.population_ids(&spec.source_population);
                let targets = target.population_ids(&spec.target_population);
                let (pair_sources, pair_targets) = resolve_pairs(&spec.name, pairs, &sources, &targets)?;
                let mut synapse = synapse.clone();
                synapse.insert("synapse_model".to_string(), json!(synapse_model));
                kernel
                    .connect(&pair_sources, &pair_targets, ConnectionRule::OneToOne, &synapse)
                    .map_err(NetworkBuildError::kernel(&spec.name))?
            }
        };
        Ok(Self {
            spec: spec.clone(),
            synapse_model: synapse_model.to_string(),
            connections,
        })
    }
}

fn resolve_pairs(
    name: &str,
    pairs: &[(usize, usize)],
    sources: &[NodeId],
    targets: &[NodeId],
) -> NetworkResult<(Vec<NodeId>, Vec<NodeId>)> {
    let mut pair_sources = Vec::with_capacity(pairs.len());
    let mut pair_targets = Vec::with_capacity(pairs.len());
    for (s, t) in pairs {
        match (sources.get(*s), targets.get(*t)) {
            (Some(source), Some(target)) => {
                pair_sources.push(*source);
                pair_targets.push(*target);
            }
            _ => {
                return Err(NetworkBuildError::InvalidProjection {
                    name: name.to_string(),
                    reason: format!(
                        "pair [{}, {}] out of range ({} sources, {} targets)",
                        s,
                        t,
                        sources.len(),
                        targets.len()
                    ),
                })
            }
        }
    }
    Ok((pair_sources, pair_targets))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(params: Value, kernel_params: Value) -> ResolvedNode {
        ResolvedNode {
            params: serde_json::from_value(params).unwrap(),
            kernel_params: serde_json::from_value(kernel_params).unwrap(),
        }
    }

    #[test]
    fn test_projection_name() {
        let spec = ProjectionSpec::new("proj_1_AMPA", "l1", "l1_exc", "l2", "l2_inh");
        assert_eq!(spec.name, "proj_1_AMPA-l1-l1_exc-l2-l2_inh");
    }

    #[test]
    fn test_topological_model_requires_rule() {
        let err = ProjectionModel::from_resolved(
            "p",
            &node(json!({}), json!({"synapse_model": "static_synapse"})),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_sources_reserved() {
        let err = ProjectionModel::from_resolved(
            "p",
            &node(
                json!({}),
                json!({"synapse_model": "s", "connection_type": "divergent", "sources": {"model": "x"}}),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NetworkBuildError::Configuration(ConfigurationError::ReservedParameter { .. })
        ));
    }

    #[test]
    fn test_explicit_pairs() {
        let model = ProjectionModel::from_resolved(
            "p",
            &node(
                json!({"type": "explicit", "pairs": [[0, 1], [1, 0]]}),
                json!({"synapse_model": "static_synapse", "weight": 2.0}),
            ),
        )
        .unwrap();
        match model.kind {
            ConnectionKind::Explicit { pairs, synapse } => {
                assert_eq!(pairs, vec![(0, 1), (1, 0)]);
                assert_eq!(synapse.get("weight"), Some(&json!(2.0)));
                assert!(!synapse.contains_key("synapse_model"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(resolve_pairs("p", &[(0, 5)], &[1, 2], &[3, 4]).is_err());
    }

    #[test]
    fn test_selector_expands_cartesian() {
        let selector = ProjectionSelector {
            projection_model: "m".to_string(),
            source_layers: vec!["a".to_string(), "b".to_string()],
            source_population: "x".to_string(),
            target_layers: vec!["c".to_string(), "d".to_string()],
            target_population: "y".to_string(),
        };
        let names: Vec<String> = selector.expand().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["m-a-x-c-y", "m-a-x-d-y", "m-b-x-c-y", "m-b-x-d-y"]);
    }
}
