// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# denest-simulation

Runs multi-session experiments on a built network.

- [`Simulation`]: validates a parameter tree, initializes the kernel, builds
  the network and runs the sessions
- [`Session`]: per-session changes, then a time advance
- [`RunMetadata`]: the files needed to reload a run's results

## Usage

```rust,no_run
use denest_simulation::{run, RunOverrides};
use std::path::PathBuf;

let summary = run(&[PathBuf::from("params/tree.json")], &RunOverrides::default()).unwrap();
println!("{:?}", summary.timing.intervals());
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod metadata;
pub mod output;
pub mod session;
pub mod simulation;
pub mod timing;

pub use error::{SessionError, SessionResult, SimulationError, SimulationResult};
pub use metadata::{resolved_snapshot, LoadedRun, RecorderMetadata, RunMetadata, Versions};
pub use output::{remove_current_link, update_current_link, write_json_atomic, OutputLayout};
pub use session::{session_name, Session, SessionReport, SessionSpec, SessionState};
pub use simulation::{
    run, RunOverrides, RunSummary, Simulation, SimulationParams, DEFAULT_CURRENT_LINK, ROOT_CHILDREN,
};
pub use timing::{SessionTiming, TimingTable};
