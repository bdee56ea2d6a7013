// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Network builder.

Builds the live network in the kernel in strict dependency order:

1. **Models**: neuron models
2. **SynapseModels**: synapse models (receptor names resolved to ports)
3. **RecorderModels**: recorder models
4. **Layers**: layers, with input-layer relays
5. **PopulationRecorders**: population recorders, wired to their units
6. **ProjectionRecorders**: projection recorders and their derived synapse models
7. **Connections**: projections

Every name reference is checked before phase 1, so a tree with a dangling
reference never touches the kernel. A failure in any phase is fatal; nothing
is rolled back or retried.
*/

use crate::error::{NetworkBuildError, NetworkResult};
use crate::layers::LiveLayer;
use crate::live::LiveNetwork;
use crate::models::ModelKind;
use crate::projections::LiveProjection;
use crate::recorders::{LiveRecorder, RecorderTarget};
use crate::spec::NetworkSpec;
use denest_kernel::Kernel;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Build phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Not started
    Pending,
    /// Checking references against the declared specs
    Validation,
    Models,
    SynapseModels,
    RecorderModels,
    Layers,
    PopulationRecorders,
    ProjectionRecorders,
    Connections,
    /// Build completed successfully
    Completed,
    /// Build failed
    Failed,
}

/// Build progress information
#[derive(Debug, Clone)]
pub struct BuildProgress {
    pub stage: BuildStage,
    pub models_created: usize,
    pub layers_created: usize,
    pub units_created: usize,
    pub recorders_created: usize,
    pub projections_created: usize,
    pub connections_created: usize,
    /// Duration of the build so far in milliseconds
    pub duration_ms: u64,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            stage: BuildStage::Pending,
            models_created: 0,
            layers_created: 0,
            units_created: 0,
            recorders_created: 0,
            projections_created: 0,
            connections_created: 0,
            duration_ms: 0,
        }
    }
}

/// One-shot network builder
pub struct NetworkBuilder {
    spec: NetworkSpec,
    progress: Arc<RwLock<BuildProgress>>,
    start_time: std::time::Instant,
}

impl NetworkBuilder {
    pub fn new(spec: NetworkSpec) -> Self {
        Self {
            spec,
            progress: Arc::new(RwLock::new(BuildProgress::default())),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    /// Snapshot of the current progress
    pub fn get_progress(&self) -> BuildProgress {
        self.progress.read().clone()
    }

    /// Shared handle for observing progress while the build runs
    pub fn progress_handle(&self) -> Arc<RwLock<BuildProgress>> {
        self.progress.clone()
    }

    /// Build the network; consumes the builder
    pub fn build(self, kernel: &mut dyn Kernel) -> NetworkResult<LiveNetwork> {
        info!(target: "denest-network", "🧬 Building network");
        match self.run_phases(kernel) {
            Ok(network) => {
                self.update_stage(BuildStage::Completed);
                let p = self.progress.read();
                info!(
                    target: "denest-network",
                    "✅ Network built in {}ms: {} models, {} layers ({} units), {} projections ({} connections), {} recorders",
                    p.duration_ms,
                    p.models_created,
                    p.layers_created,
                    p.units_created,
                    p.projections_created,
                    p.connections_created,
                    p.recorders_created
                );
                Ok(network)
            }
            Err(e) => {
                let stage = self.progress.read().stage;
                error!(target: "denest-network", "❌ Network build failed during {:?}: {}", stage, e);
                self.update_stage(BuildStage::Failed);
                Err(e)
            }
        }
    }

    fn run_phases(&self, kernel: &mut dyn Kernel) -> NetworkResult<LiveNetwork> {
        self.update_stage(BuildStage::Validation);
        self.spec.validate_references(&*kernel)?;

        for (stage, kind) in [
            (BuildStage::Models, ModelKind::Neuron),
            (BuildStage::SynapseModels, ModelKind::Synapse),
            (BuildStage::RecorderModels, ModelKind::Recorder),
        ] {
            self.update_stage(stage);
            let created = self.spec.models.create(kind, kernel)?;
            self.update_progress(|p| p.models_created += created);
            debug!(target: "denest-network", "  ✓ {} {} created", created, kind.group());
        }

        self.update_stage(BuildStage::Layers);
        let mut layers = BTreeMap::new();
        for spec in self.spec.layers.values() {
            let layer = LiveLayer::create(spec, kernel)?;
            let units = layer.handle.nodes.len();
            self.update_progress(|p| {
                p.layers_created += 1;
                p.units_created += units;
            });
            debug!(target: "denest-network", "  ✓ Layer `{}`: {} units", spec.name, units);
            layers.insert(spec.name.clone(), layer);
        }

        self.update_stage(BuildStage::PopulationRecorders);
        let mut recorders = Vec::new();
        for spec in &self.spec.population_recorders {
            if let RecorderTarget::Population { layer, population } = &spec.target {
                let live_layer = layers
                    .get(layer)
                    .ok_or_else(|| NetworkBuildError::UnknownReference {
                        object: spec.label.clone(),
                        kind: "layer",
                        name: layer.clone(),
                    })?;
                recorders.push(LiveRecorder::create_for_population(spec, live_layer, population, kernel)?);
                self.update_progress(|p| p.recorders_created += 1);
            }
        }

        self.update_stage(BuildStage::ProjectionRecorders);
        let mut synapse_overrides: BTreeMap<String, String> = BTreeMap::new();
        for spec in &self.spec.projection_recorders {
            if let RecorderTarget::Projection { projection } = &spec.target {
                let synapse_model = self.synapse_model_of(projection)?;
                let (recorder, derived) =
                    LiveRecorder::create_for_projection(spec, projection, &synapse_model, kernel)?;
                synapse_overrides.insert(projection.clone(), derived);
                recorders.push(recorder);
                self.update_progress(|p| p.recorders_created += 1);
            }
        }

        self.update_stage(BuildStage::Connections);
        let mut projections = BTreeMap::new();
        for spec in &self.spec.projections {
            let model = self.spec.projection_models.get(&spec.model).ok_or_else(|| {
                NetworkBuildError::UnknownReference {
                    object: spec.name.clone(),
                    kind: "projection model",
                    name: spec.model.clone(),
                }
            })?;
            let synapse_model = synapse_overrides
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| model.synapse_model.clone());
            let (source, target) = match (layers.get(&spec.source_layer), layers.get(&spec.target_layer)) {
                (Some(source), Some(target)) => (source, target),
                _ => {
                    return Err(NetworkBuildError::InvalidProjection {
                        name: spec.name.clone(),
                        reason: "source or target layer was not built".to_string(),
                    })
                }
            };
            let projection = LiveProjection::create(spec, model, &synapse_model, source, target, kernel)?;
            let connections = projection.connections;
            self.update_progress(|p| {
                p.projections_created += 1;
                p.connections_created += connections;
            });
            debug!(target: "denest-network", "  ✓ `{}`: {} connections", spec.name, connections);
            projections.insert(spec.name.clone(), projection);
        }

        Ok(LiveNetwork::new(self.spec.clone(), layers, projections, recorders))
    }

    fn synapse_model_of(&self, projection: &str) -> NetworkResult<String> {
        self.spec
            .projections
            .iter()
            .find(|p| p.name == projection)
            .and_then(|p| self.spec.projection_models.get(&p.model))
            .map(|m| m.synapse_model.clone())
            .ok_or_else(|| NetworkBuildError::UnknownReference {
                object: projection.to_string(),
                kind: "projection",
                name: projection.to_string(),
            })
    }

    fn update_stage(&self, stage: BuildStage) {
        let mut p = self.progress.write();
        p.stage = stage;
        p.duration_ms = u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
    }

    fn update_progress<F>(&self, f: F)
    where
        F: FnOnce(&mut BuildProgress),
    {
        let mut p = self.progress.write();
        f(&mut p);
        p.duration_ms = u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
    }
}
