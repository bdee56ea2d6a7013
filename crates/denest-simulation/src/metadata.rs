// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Run metadata: what is needed to reload a run's results later.

Written once per run, in this order:

1. `parameter_tree.json`: every node with its resolved parameters
2. `data/<recorder>.json`: one file per recorder
3. `sessions/session_times.json`: planned timing, rewritten after each session
   together with `sessions/<session>.json`
4. `versions.json`: written last, so its presence marks a finished run
*/

use crate::error::{SimulationError, SimulationResult};
use crate::output::{write_json_atomic, OutputLayout};
use crate::timing::TimingTable;
use chrono::{DateTime, Utc};
use denest_kernel::{Kernel, KernelResult, NodeId, RecordingMode};
use denest_network::{LiveNetwork, LiveRecorder, RecorderTarget};
use denest_params::{ParamGroup, ParamTree, ParamsResult, TreeMerger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Version strings of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    pub denest: String,
    pub kernel: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Versions {
    pub fn new(kernel: &dyn Kernel, started_at: DateTime<Utc>) -> Self {
        Self {
            denest: crate::VERSION.to_string(),
            kernel: kernel.version(),
            started_at,
            finished_at: None,
        }
    }
}

/// Everything needed to map a recorder's raw output back onto the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderMetadata {
    pub label: String,
    pub model: String,
    pub recorder_id: NodeId,
    pub target: RecorderTarget,
    /// Recorded quantities (`spikes`, state variable names, `weights`)
    pub quantities: Vec<String>,
    /// Ids of the recorded units
    pub ids: Vec<NodeId>,
    /// `[rows, columns]` of the target layer
    pub shape: Option<[usize; 2]>,
    /// Unit id → `[row, column, unit]`
    pub locations: BTreeMap<NodeId, [usize; 3]>,
    /// Number of recorded connections, for projection recorders
    pub connections: Option<usize>,
}

impl RecorderMetadata {
    pub fn collect(recorder: &LiveRecorder, network: &LiveNetwork, kernel: &dyn Kernel) -> KernelResult<Self> {
        let quantities = match recorder.mode {
            RecordingMode::Events => vec!["spikes".to_string()],
            RecordingMode::Synaptic => vec!["weights".to_string()],
            RecordingMode::Sampled => match kernel.get_status(recorder.id, "record_from")? {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            },
        };

        let (shape, locations, connections) = match &recorder.spec.target {
            RecorderTarget::Population { layer, population } => match network.layer(layer) {
                Some(live) => (
                    Some([live.spec.geometry.rows, live.spec.geometry.columns]),
                    live.locations(population).into_iter().collect(),
                    None,
                ),
                None => (None, BTreeMap::new(), None),
            },
            RecorderTarget::Projection { projection } => (
                None,
                BTreeMap::new(),
                network.projection(projection).map(|p| p.connections),
            ),
        };

        Ok(Self {
            label: recorder.label().to_string(),
            model: recorder.spec.model.clone(),
            recorder_id: recorder.id,
            target: recorder.spec.target.clone(),
            quantities,
            ids: recorder.targets.clone(),
            shape,
            locations,
            connections,
        })
    }
}

/// Nested document of the tree where every node carries its resolved
/// parameters and no inheritance reference
///
/// Loading the snapshot back resolves to the same parameters.
pub fn resolved_snapshot(tree: &ParamTree) -> ParamsResult<Value> {
    let mut merger = TreeMerger::new(tree);
    let mut snapshot = ParamTree::new();
    for (path, node) in merger.resolve_all()? {
        snapshot.ensure_node(&path)?;
        for (key, value) in &node.params {
            snapshot.set(&path, ParamGroup::Params, key, value.clone())?;
        }
        for (key, value) in &node.kernel_params {
            snapshot.set(&path, ParamGroup::KernelParams, key, value.clone())?;
        }
    }
    Ok(snapshot.to_value())
}

/// Writer for one run's metadata
#[derive(Debug, Clone)]
pub struct RunMetadata {
    layout: OutputLayout,
    versions: Versions,
}

impl RunMetadata {
    pub fn new(layout: OutputLayout, versions: Versions) -> Self {
        Self { layout, versions }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Tree snapshot, recorder metadata and planned session times
    pub fn write_initial(
        &self,
        tree: &ParamTree,
        network: &LiveNetwork,
        kernel: &dyn Kernel,
        timing: &TimingTable,
    ) -> SimulationResult<()> {
        write_json_atomic(&self.layout.parameter_tree(), &resolved_snapshot(tree)?)?;
        for recorder in network.recorders() {
            let metadata = RecorderMetadata::collect(recorder, network, kernel)?;
            write_json_atomic(&self.layout.recorder(recorder.label()), &metadata)?;
        }
        self.write_session_times(timing)
    }

    pub fn write_session_times(&self, timing: &TimingTable) -> SimulationResult<()> {
        write_json_atomic(&self.layout.session_times(), timing)
    }

    /// Report of one finished session, then the updated timing table
    pub fn write_session<T: Serialize>(
        &self,
        name: &str,
        report: &T,
        timing: &TimingTable,
    ) -> SimulationResult<()> {
        write_json_atomic(&self.layout.session(name), report)?;
        self.write_session_times(timing)
    }

    /// Final timing table and version strings
    pub fn finalize(&mut self, timing: &TimingTable) -> SimulationResult<()> {
        self.write_session_times(timing)?;
        self.versions.finished_at = Some(Utc::now());
        write_json_atomic(&self.layout.versions(), &self.versions)
    }
}

/// Metadata of a finished run, read back from its output directory
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRun {
    pub versions: Versions,
    /// Session name → `(start, end)`
    pub session_times: BTreeMap<String, (f64, f64)>,
    pub recorders: BTreeMap<String, RecorderMetadata>,
    pub parameter_tree: Value,
}

impl LoadedRun {
    pub fn load(output_dir: &Path) -> SimulationResult<Self> {
        let layout = OutputLayout::new(output_dir);
        let mut recorders = BTreeMap::new();
        let data_dir = layout.data_dir();
        for entry in fs::read_dir(&data_dir).map_err(SimulationError::io(&data_dir))? {
            let path = entry.map_err(SimulationError::io(&data_dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let metadata: RecorderMetadata = read_json(&path)?;
                recorders.insert(metadata.label.clone(), metadata);
            }
        }
        Ok(Self {
            versions: read_json(&layout.versions())?,
            session_times: read_json(&layout.session_times())?,
            recorders,
            parameter_tree: read_json(&layout.parameter_tree())?,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> SimulationResult<T> {
    let content = fs::read_to_string(path).map_err(SimulationError::io(path))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use denest_params::{tree_from_value, NodePath};
    use serde_json::json;

    #[test]
    fn test_snapshot_resolves_inheritance() {
        let tree = tree_from_value(
            &json!({
                "network": {
                    "layers": {
                        "params": {"populations": {"a": 1}},
                        "kernel_params": {"rows": 2, "columns": 2},
                        "l1": {},
                        "l2": {"kernel_params": {"rows": 5}}
                    }
                }
            }),
            "test",
        )
        .unwrap();
        let snapshot = resolved_snapshot(&tree).unwrap();
        let layers = &snapshot["network"]["layers"];
        assert_eq!(layers["l1"]["params"]["populations"], json!({"a": 1}));
        assert_eq!(layers["l1"]["kernel_params"], json!({"rows": 2, "columns": 2}));
        assert_eq!(layers["l2"]["kernel_params"]["rows"], json!(5));
        assert!(layers["l2"].get("inherits").is_none());

        // reloading gives the same resolution
        let reloaded = tree_from_value(&snapshot, "snapshot").unwrap();
        let path = NodePath::parse("network/layers/l2");
        assert_eq!(
            TreeMerger::new(&tree).resolve(&path).unwrap(),
            TreeMerger::new(&reloaded).resolve(&path).unwrap()
        );
    }
}
