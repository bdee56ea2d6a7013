// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The built network: name → kernel identity tables

use crate::layers::{LayerKind, LiveLayer};
use crate::projections::LiveProjection;
use crate::recorders::LiveRecorder;
use crate::spec::NetworkSpec;
use denest_kernel::NodeId;
use std::collections::{BTreeMap, BTreeSet};

/// Network as it exists in the kernel
///
/// Produced once by [`crate::NetworkBuilder::build`] and mutated afterwards
/// only through changes applied by the session engine.
#[derive(Debug, Clone)]
pub struct LiveNetwork {
    spec: NetworkSpec,
    layers: BTreeMap<String, LiveLayer>,
    projections: BTreeMap<String, LiveProjection>,
    recorders: Vec<LiveRecorder>,
    changed_layers: BTreeSet<String>,
}

impl LiveNetwork {
    pub(crate) fn new(
        spec: NetworkSpec,
        layers: BTreeMap<String, LiveLayer>,
        projections: BTreeMap<String, LiveProjection>,
        recorders: Vec<LiveRecorder>,
    ) -> Self {
        Self {
            spec,
            layers,
            projections,
            recorders,
            changed_layers: BTreeSet::new(),
        }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn layer(&self, name: &str) -> Option<&LiveLayer> {
        self.layers.get(name)
    }

    /// Layers sorted by name
    pub fn layers(&self) -> impl Iterator<Item = &LiveLayer> {
        self.layers.values()
    }

    pub fn input_layers(&self) -> impl Iterator<Item = &LiveLayer> {
        self.layers.values().filter(|l| l.kind() == LayerKind::InputLayer)
    }

    pub fn projection(&self, name: &str) -> Option<&LiveProjection> {
        self.projections.get(name)
    }

    /// Projections sorted by name
    pub fn projections(&self) -> impl Iterator<Item = &LiveProjection> {
        self.projections.values()
    }

    pub fn recorders(&self) -> &[LiveRecorder] {
        &self.recorders
    }

    pub fn recorder(&self, label: &str) -> Option<&LiveRecorder> {
        self.recorders.iter().find(|r| r.label() == label)
    }

    pub fn recorder_ids(&self) -> Vec<NodeId> {
        self.recorders.iter().map(|r| r.id).collect()
    }

    /// Stimulation devices of every input layer, sorted
    pub fn stimulator_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .input_layers()
            .filter_map(|layer| {
                layer
                    .spec
                    .stimulator_model()
                    .map(|model| layer.population_ids(model))
            })
            .flatten()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether a unit change already modified units of this layer
    pub fn layer_changed(&self, name: &str) -> bool {
        self.changed_layers.contains(name)
    }

    pub fn changed_layers(&self) -> impl Iterator<Item = &str> {
        self.changed_layers.iter().map(String::as_str)
    }

    pub(crate) fn mark_changed(&mut self, layers: impl IntoIterator<Item = String>) {
        self.changed_layers.extend(layers);
    }
}
