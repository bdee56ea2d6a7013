// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Session engine.

A session moves through `Pending → Initializing → Running → Done`, or to
`Failed` on the first error.

Initialization, in order:

1. reset the network's dynamic state (`reset_network`)
2. shift the `origin` of every input stimulator to the session start
3. apply synapse changes, then unit changes, each list in declared order
4. when `record` is false, push every recorder's `start` to the session end

Running advances the kernel by `simulation_time` and checks that the kernel
clock lands on the session end.
*/

use crate::error::{SessionError, SessionResult, SimulationError, SimulationResult};
use crate::timing::whole_millis;
use chrono::{DateTime, Utc};
use denest_kernel::{Kernel, Status};
use denest_network::{ChangeError, LiveNetwork, SynapseChange, UnitChange};
use denest_params::{ConfigurationError, ResolvedNode, Schema};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Kernel clocks closer than this are considered equal, in ms
const CLOCK_TOLERANCE_MS: f64 = 1e-6;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Initializing,
    Running,
    Done,
    Failed,
}

/// `NN_<model>`, with a zero-padded index
pub fn session_name(index: usize, model: &str) -> String {
    format!("{:02}_{}", index, model)
}

/// Validated parameters of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSpec {
    pub name: String,
    /// Session model this session was created from
    pub model: String,
    /// Duration in ms
    pub simulation_time: f64,
    pub reset_network: bool,
    pub record: bool,
    pub synapse_changes: Vec<SynapseChange>,
    pub unit_changes: Vec<UnitChange>,
}

impl SessionSpec {
    pub fn schema() -> Schema {
        Schema::new()
            .mandatory("simulation_time")
            .optional("reset_network", false)
            .optional("record", true)
            .optional("unit_changes", json!([]))
            .optional("synapse_changes", json!([]))
    }

    /// Validate a resolved session model leaf
    ///
    /// Session models take no kernel parameters. Every change entry is
    /// parsed here, so a malformed change fails before the kernel is touched.
    pub fn from_resolved(index: usize, model: &str, node: &ResolvedNode) -> SimulationResult<Self> {
        let name = session_name(index, model);
        Schema::new().validate(&name, &node.kernel_params)?;
        let params = Self::schema().validate(&name, &node.params)?;

        let simulation_time = params.get_f64("simulation_time")?;
        if !simulation_time.is_finite() || simulation_time < 0.0 {
            return Err(ConfigurationError::InvalidParameterValue {
                object: name,
                key: "simulation_time".to_string(),
                reason: format!("must be a non-negative duration, got {}", simulation_time),
            }
            .into());
        }

        let parse_error = |source: ChangeError| -> SimulationError {
            SessionError::Change {
                session: name.clone(),
                source,
            }
            .into()
        };
        let synapse_changes = params
            .get_list("synapse_changes")?
            .iter()
            .enumerate()
            .map(|(i, entry)| SynapseChange::from_value(&format!("{}/synapse_changes[{}]", name, i), entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(parse_error)?;
        let unit_changes = params
            .get_list("unit_changes")?
            .iter()
            .enumerate()
            .map(|(i, entry)| UnitChange::from_value(&format!("{}/unit_changes[{}]", name, i), entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(parse_error)?;

        Ok(Self {
            model: model.to_string(),
            simulation_time,
            reset_network: params.get_bool("reset_network")?,
            record: params.get_bool("record")?,
            synapse_changes,
            unit_changes,
            name,
        })
    }

    pub fn proportional_changes(&self) -> impl Iterator<Item = &UnitChange> {
        self.unit_changes.iter().filter(|c| c.is_proportional())
    }
}

/// One session of a run, bound to its place on the kernel clock
#[derive(Debug, Clone)]
pub struct Session {
    spec: SessionSpec,
    start: f64,
    end: f64,
    state: SessionState,
    real_time: Option<Duration>,
    started_at: Option<DateTime<Utc>>,
}

/// Serialized form of a session, written after it ran
#[derive(Debug, Serialize)]
pub struct SessionReport<'a> {
    #[serde(flatten)]
    pub spec: &'a SessionSpec,
    pub start: f64,
    pub end: f64,
    pub state: SessionState,
    pub real_time_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Session starting at kernel time `start`
    pub fn new(spec: SessionSpec, start: f64) -> Self {
        let end = start + spec.simulation_time;
        Self {
            spec,
            start,
            end,
            state: SessionState::Pending,
            real_time: None,
            started_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wall-clock running time, once the session is done
    pub fn real_time(&self) -> Option<Duration> {
        self.real_time
    }

    pub fn report(&self) -> SessionReport<'_> {
        SessionReport {
            spec: &self.spec,
            start: self.start,
            end: self.end,
            state: self.state,
            real_time_ms: self.real_time.map(whole_millis),
            started_at: self.started_at,
        }
    }

    fn check_clock(&self, kernel: &dyn Kernel, expected: f64) -> SessionResult<()> {
        let actual = kernel.time();
        if (actual - expected).abs() > CLOCK_TOLERANCE_MS {
            return Err(SessionError::ClockMismatch {
                session: self.spec.name.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Prepare the network for this session
    pub fn initialize(
        &mut self,
        kernel: &mut dyn Kernel,
        network: &mut LiveNetwork,
        rng: &mut ChaCha8Rng,
    ) -> SessionResult<()> {
        if self.state != SessionState::Pending {
            return Err(SessionError::InvalidState {
                session: self.spec.name.clone(),
                state: self.state,
                action: "initialize",
            });
        }
        self.state = SessionState::Initializing;
        let result = self.initialize_steps(kernel, network, rng);
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    fn initialize_steps(
        &mut self,
        kernel: &mut dyn Kernel,
        network: &mut LiveNetwork,
        rng: &mut ChaCha8Rng,
    ) -> SessionResult<()> {
        let name = self.spec.name.clone();
        self.check_clock(&*kernel, self.start)?;
        info!(target: "denest-simulation", "Initializing session `{}`...", name);

        if self.spec.reset_network {
            debug!(target: "denest-simulation", "  Resetting network state");
            kernel.reset_network().map_err(SessionError::kernel(&name))?;
        }

        let stimulators = network.stimulator_ids();
        if !stimulators.is_empty() {
            debug!(
                target: "denest-simulation",
                "  Setting origin of {} stimulators to {} ms",
                stimulators.len(),
                self.start
            );
            let origin: Status = [("origin".to_string(), json!(self.start))].into_iter().collect();
            kernel
                .set_status(&stimulators, &origin)
                .map_err(SessionError::kernel(&name))?;
        }

        for change in &self.spec.synapse_changes {
            change.apply(kernel, network).map_err(SessionError::change(&name))?;
        }
        for change in &self.spec.unit_changes {
            if let Some(layer) = change.conflicting_layer(network) {
                return Err(SessionError::RepeatedProportionalChange {
                    session: name,
                    change: change.label.clone(),
                    layer,
                });
            }
            change.apply(kernel, network, rng).map_err(SessionError::change(&name))?;
        }

        if !self.spec.record {
            let recorders = network.recorder_ids();
            if !recorders.is_empty() {
                debug!(
                    target: "denest-simulation",
                    "  Inactivating {} recorders until {} ms",
                    recorders.len(),
                    self.end
                );
                let start: Status = [("start".to_string(), Value::from(self.end))].into_iter().collect();
                kernel
                    .set_status(&recorders, &start)
                    .map_err(SessionError::kernel(&name))?;
            }
        }
        Ok(())
    }

    /// Initialize (if needed) and run the session
    ///
    /// Returns the wall-clock running time.
    pub fn run(
        &mut self,
        kernel: &mut dyn Kernel,
        network: &mut LiveNetwork,
        rng: &mut ChaCha8Rng,
    ) -> SessionResult<Duration> {
        if self.state == SessionState::Pending {
            self.initialize(kernel, network, rng)?;
        }
        if self.state != SessionState::Initializing {
            return Err(SessionError::InvalidState {
                session: self.spec.name.clone(),
                state: self.state,
                action: "run",
            });
        }

        self.state = SessionState::Running;
        self.started_at = Some(Utc::now());
        info!(
            target: "denest-simulation",
            "▶️  Running session `{}` for {} ms ({} → {} ms)",
            self.spec.name,
            self.spec.simulation_time,
            self.start,
            self.end
        );
        let wall = Instant::now();
        let advanced = kernel
            .advance(self.spec.simulation_time)
            .map_err(SessionError::kernel(&self.spec.name))
            .and_then(|()| self.check_clock(&*kernel, self.end));
        if let Err(e) = advanced {
            self.state = SessionState::Failed;
            return Err(e);
        }
        let elapsed = wall.elapsed();
        self.real_time = Some(elapsed);
        self.state = SessionState::Done;
        info!(
            target: "denest-simulation",
            "✅ Session `{}` done: {} ms virtual, {:.3} s real",
            self.spec.name,
            self.spec.simulation_time,
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }
}
