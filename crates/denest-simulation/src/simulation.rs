// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Simulation orchestrator.

[`Simulation::new`] does everything that needs no kernel: it validates the
tree, resolves every subtree, plans the sessions on the virtual clock and
assembles the network spec. A bad tree therefore fails before the kernel is
touched. [`Simulation::run`] then drives the kernel:

1. initialize the kernel from [`KernelConfig`]
2. build the network
3. write the initial run metadata
4. run the sessions in order, persisting each one as it completes
5. finalize the metadata and move the `current` link
*/

use crate::error::SimulationResult;
use crate::metadata::{RunMetadata, Versions};
use crate::output::{update_current_link, OutputLayout};
use crate::session::{Session, SessionSpec};
use crate::timing::TimingTable;
use chrono::Utc;
use denest_config::DenestConfig;
use denest_kernel::{InMemoryKernel, Kernel, KernelConfig, SeedPlan};
use denest_network::{LiveNetwork, NetworkBuilder, NetworkSpec};
use denest_params::{load_trees, ConfigurationError, NodePath, ParamTree, Schema, TreeMerger};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Children allowed under the tree root
pub const ROOT_CHILDREN: &[&str] = &["kernel", "simulation", "session_models", "network"];

/// Name of the link pointing at the latest run, unless configured otherwise
pub const DEFAULT_CURRENT_LINK: &str = "current";

/// Values that take precedence over the tree's `simulation` params
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub output_dir: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub clear_output_dir: Option<bool>,
    /// Name of the latest-run link; `None` uses [`DEFAULT_CURRENT_LINK`]
    pub current_link: Option<String>,
}

impl RunOverrides {
    pub fn from_config(config: &DenestConfig) -> Self {
        Self {
            output_dir: config.paths.output_dir.clone(),
            input_dir: config.paths.input_dir.clone(),
            clear_output_dir: config.output.clear_output_dir,
            current_link: Some(config.output.current_link.clone()),
        }
    }
}

/// Validated `simulation` params, overrides applied
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    /// Session models, in run order
    pub sessions: Vec<String>,
    pub output_dir: PathBuf,
    pub input_dir: PathBuf,
    pub clear_output_dir: bool,
}

impl SimulationParams {
    pub fn schema() -> Schema {
        Schema::new()
            .optional("sessions", json!([]))
            .optional("output_dir", "output")
            .optional("input_dir", "input")
            .optional("clear_output_dir", true)
    }
}

/// A fully validated run, ready to drive a kernel
pub struct Simulation {
    tree: ParamTree,
    params: SimulationParams,
    kernel_config: KernelConfig,
    network_spec: NetworkSpec,
    sessions: Vec<Session>,
    timing: TimingTable,
    layout: OutputLayout,
    current_link: String,
}

fn check_children(tree: &ParamTree, path: &NodePath, allowed: &[&str]) -> SimulationResult<()> {
    for child in tree.child_names(path) {
        if !allowed.contains(&child.as_str()) {
            let object = if path.is_root() { "<root>".to_string() } else { path.to_string() };
            return Err(ConfigurationError::UnrecognizedChild { object, child }.into());
        }
    }
    Ok(())
}

impl Simulation {
    /// Validate and resolve `tree`; the tree is frozen from here on
    pub fn new(mut tree: ParamTree, overrides: &RunOverrides) -> SimulationResult<Self> {
        tree.freeze();
        let root = NodePath::root();
        check_children(&tree, &root, ROOT_CHILDREN)?;
        let mut merger = TreeMerger::new(&tree);

        let root_node = merger.resolve(&root)?;
        Schema::new().validate("<root>", &root_node.params)?;
        Schema::new().validate("<root>", &root_node.kernel_params)?;

        // simulation
        let simulation_path = root.child("simulation");
        check_children(&tree, &simulation_path, &[])?;
        let simulation_node = if tree.contains(&simulation_path) {
            merger.resolve(&simulation_path)?
        } else {
            Default::default()
        };
        Schema::new().validate("simulation", &simulation_node.kernel_params)?;
        let sim = SimulationParams::schema().validate("simulation", &simulation_node.params)?;
        let output_dir = PathBuf::from(sim.get_str("output_dir")?);
        let input_dir = PathBuf::from(sim.get_str("input_dir")?);
        let params = SimulationParams {
            sessions: sim.get_str_list("sessions")?,
            output_dir: overrides.output_dir.clone().unwrap_or(output_dir),
            input_dir: overrides.input_dir.clone().unwrap_or(input_dir),
            clear_output_dir: match overrides.clear_output_dir {
                Some(clear) => clear,
                None => sim.get_bool("clear_output_dir")?,
            },
        };

        // kernel
        let layout = OutputLayout::new(&params.output_dir);
        let kernel_path = root.child("kernel");
        check_children(&tree, &kernel_path, &[])?;
        let kernel_node = if tree.contains(&kernel_path) {
            merger.resolve(&kernel_path)?
        } else {
            Default::default()
        };
        let kernel_config = KernelConfig::from_params(&kernel_node, layout.data_dir())?;

        // sessions
        let session_models_path = root.child("session_models");
        let mut session_models = BTreeMap::new();
        if tree.contains(&session_models_path) {
            for (path, node) in merger.resolve_leaves(&session_models_path)? {
                let name = path.name().to_string();
                if session_models.insert(name.clone(), node).is_some() {
                    return Err(ConfigurationError::DuplicateModel { name }.into());
                }
            }
        }
        let mut sessions = Vec::new();
        let mut timing = TimingTable::new();
        let mut start = 0.0;
        for (index, model) in params.sessions.iter().enumerate() {
            let node = session_models
                .get(model)
                .ok_or_else(|| ConfigurationError::InvalidParameterValue {
                    object: "simulation".to_string(),
                    key: "sessions".to_string(),
                    reason: format!("unknown session model `{}`", model),
                })?;
            let session = Session::new(SessionSpec::from_resolved(index, model, node)?, start);
            timing.plan(session.name(), session.start(), session.end());
            start = session.end();
            sessions.push(session);
        }

        // network
        let network_path = root.child("network");
        let network_spec = if tree.contains(&network_path) {
            NetworkSpec::from_tree(&tree, &network_path)?
        } else {
            NetworkSpec::default()
        };

        info!(
            target: "denest-simulation",
            "Simulation: {} sessions ({} ms), input from {}, output in {}",
            sessions.len(),
            timing.total_time(),
            params.input_dir.display(),
            params.output_dir.display()
        );

        drop(merger);
        Ok(Self {
            tree,
            params,
            kernel_config,
            network_spec,
            sessions,
            timing,
            layout,
            current_link: overrides
                .current_link
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENT_LINK.to_string()),
        })
    }

    /// Load the tree documents at `paths` (earlier documents win) and validate
    pub fn from_paths(paths: &[PathBuf], overrides: &RunOverrides) -> SimulationResult<Self> {
        Self::new(load_trees(paths)?, overrides)
    }

    pub fn tree(&self) -> &ParamTree {
        &self.tree
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn kernel_config(&self) -> &KernelConfig {
        &self.kernel_config
    }

    pub fn network_spec(&self) -> &NetworkSpec {
        &self.network_spec
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn timing(&self) -> &TimingTable {
        &self.timing
    }

    pub fn output_dir(&self) -> &Path {
        self.layout.root()
    }

    /// Run every session against `kernel`
    pub fn run(&mut self, kernel: &mut dyn Kernel) -> SimulationResult<RunSummary> {
        let started_at = Utc::now();
        info!(target: "denest-simulation", "🚀 Starting simulation");

        self.layout.prepare(self.params.clear_output_dir)?;

        info!(target: "denest-simulation", "Initializing kernel...");
        let seeds = self.kernel_config.initialize(kernel)?;

        let mut network = NetworkBuilder::new(self.network_spec.clone()).build(kernel)?;

        let mut metadata = RunMetadata::new(self.layout.clone(), Versions::new(&*kernel, started_at));
        metadata.write_initial(&self.tree, &network, &*kernel, &self.timing)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.kernel_config.selection_seed);
        self.run_sessions(kernel, &mut network, &mut rng, &metadata)?;

        metadata.finalize(&self.timing)?;
        let current_link = match update_current_link(self.layout.root(), &self.current_link) {
            Ok(link) => link,
            Err(e) => {
                warn!(target: "denest-simulation", "Could not update `{}` link: {}", self.current_link, e);
                None
            }
        };

        info!(
            target: "denest-simulation",
            "🏁 Simulation finished: {} sessions, kernel time {} ms",
            self.sessions.len(),
            kernel.time()
        );
        Ok(RunSummary {
            output_dir: self.layout.root().to_path_buf(),
            current_link,
            timing: self.timing.clone(),
            seeds,
            network,
        })
    }

    fn run_sessions(
        &mut self,
        kernel: &mut dyn Kernel,
        network: &mut LiveNetwork,
        rng: &mut ChaCha8Rng,
        metadata: &RunMetadata,
    ) -> SimulationResult<()> {
        info!(target: "denest-simulation", "Running {} sessions...", self.sessions.len());
        for session in &mut self.sessions {
            let real_time = session.run(kernel, network, rng)?;
            self.timing.complete(session.name(), real_time);
            metadata.write_session(session.name(), &session.report(), &self.timing)?;
        }
        Ok(())
    }
}

/// Outcome of a finished run
#[derive(Debug)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub current_link: Option<PathBuf>,
    pub timing: TimingTable,
    pub seeds: SeedPlan,
    pub network: LiveNetwork,
}

/// Load, validate and run the trees at `paths` against a fresh
/// [`InMemoryKernel`]
pub fn run(paths: &[PathBuf], overrides: &RunOverrides) -> SimulationResult<RunSummary> {
    let mut simulation = Simulation::from_paths(paths, overrides)?;
    let mut kernel = InMemoryKernel::new();
    simulation.run(&mut kernel)
}
