// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# denest-network

Turns the `network` subtree of a parameter tree into a live network in the
kernel, and applies parameter changes to it between sessions.

## Pipeline

```text
ParamTree ──► NetworkSpec::from_tree ──► NetworkBuilder::build ──► LiveNetwork
                 (models, layers,           (7 ordered phases)        │
                  projections, recorders)                             ▼
                                                  UnitChange / SynapseChange::apply
```
*/

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builder;
pub mod changes;
pub mod error;
pub mod layers;
pub mod live;
pub mod models;
pub mod projections;
pub mod recorders;
pub mod spec;

pub use builder::{BuildProgress, BuildStage, NetworkBuilder};
pub use changes::{matches_pattern, ChangeType, SynapseChange, UnitChange};
pub use error::{ChangeError, ChangeResult, NetworkBuildError, NetworkResult};
pub use layers::{LayerKind, LayerSpec, LiveLayer, INPUT_LAYER_TYPE};
pub use live::LiveNetwork;
pub use models::{ModelKind, ModelRegistry, ModelSpec, ReceptorBinding, PARROT_MODEL};
pub use projections::{projection_name, ConnectionKind, LiveProjection, ProjectionModel, ProjectionSpec};
pub use recorders::{LiveRecorder, RecorderSpec, RecorderTarget};
pub use spec::{NetworkSpec, NETWORK_CHILDREN};
