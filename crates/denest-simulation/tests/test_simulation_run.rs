// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Whole runs against the in-memory kernel

use denest_kernel::{InMemoryKernel, Kernel, KernelCall, KernelError, NodeId};
use denest_params::{tree_from_value, ConfigurationError};
use denest_simulation::{
    run, LoadedRun, RunOverrides, Session, SessionError, SessionState, Simulation, SimulationError,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn network() -> Value {
    json!({
        "neuron_models": {
            "l1_exc": {"params": {"model": "iaf_psc_alpha"}},
            "input_exc": {"params": {"model": "spike_generator"}}
        },
        "synapse_models": {
            "exc_syn": {"params": {"model": "static_synapse"}}
        },
        "recorder_models": {
            "my_spike_detector": {"params": {"model": "spike_detector"}},
            "my_multimeter": {"params": {"model": "multimeter"}, "kernel_params": {"record_from": ["V_m"]}}
        },
        "layers": {
            "kernel_params": {"rows": 3, "columns": 3},
            "input_layer": {"params": {"type": "InputLayer", "populations": {"input_exc": 1}}},
            "l1": {"params": {"populations": {"l1_exc": 2}}}
        },
        "projection_models": {
            "proj": {"kernel_params": {
                "synapse_model": "exc_syn",
                "connection_type": "divergent",
                "mask": {"circular": {"radius": 1.0}}
            }}
        },
        "topology": {"params": {"projections": [{
            "projection_model": "proj",
            "source_layers": ["input_layer"],
            "source_population": "parrot_neuron",
            "target_layers": ["l1"],
            "target_population": "l1_exc"
        }]}},
        "recorders": {"params": {"population_recorders": [
            {"model": "my_spike_detector", "layers": ["l1"], "populations": ["l1_exc"]},
            {"model": "my_multimeter", "layers": ["l1"], "populations": ["l1_exc"]}
        ]}}
    })
}

fn spikes(times: &[f64]) -> Value {
    json!({
        "simulation_time": 100.0,
        "unit_changes": [{
            "layer": "input_layer",
            "population": "input_exc",
            "params": {"spike_times": times}
        }]
    })
}

fn document(output_dir: &Path) -> Value {
    json!({
        "kernel": {
            "params": {"kernel_seed": 5, "selection_seed": 11},
            "kernel_params": {"resolution": 0.1}
        },
        "simulation": {"params": {
            "sessions": ["warmup", "3_spikes", "2_spikes", "3_spikes"],
            "output_dir": output_dir.display().to_string()
        }},
        "session_models": {
            "warmup": {"params": {"simulation_time": 100.0, "record": false}},
            "3_spikes": {"params": spikes(&[10.0, 20.0, 30.0])},
            "2_spikes": {"params": spikes(&[10.0, 20.0])}
        },
        "network": network()
    })
}

fn simulation(document: &Value) -> Result<Simulation, SimulationError> {
    Simulation::new(tree_from_value(document, "test").unwrap(), &RunOverrides::default())
}

/// `(nodes, value)` of every `set_status` call that set `key`
fn status_calls(kernel: &InMemoryKernel, key: &str) -> Vec<(Vec<NodeId>, Value)> {
    kernel
        .journal()
        .iter()
        .filter_map(|entry| match &entry.call {
            KernelCall::SetStatus { nodes, status } => status.get(key).map(|v| (nodes.clone(), v.clone())),
            _ => None,
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Session sequence
// ═══════════════════════════════════════════════════════════

#[test]
fn test_four_sessions_timing_and_origins() {
    let dir = tempdir().unwrap();
    let output_dir = dir.path().join("run");
    let mut sim = simulation(&document(&output_dir)).unwrap();
    let mut kernel = InMemoryKernel::new();
    let summary = sim.run(&mut kernel).unwrap();

    assert_eq!(
        summary.timing.intervals(),
        vec![(0.0, 100.0), (100.0, 200.0), (200.0, 300.0), (300.0, 400.0)]
    );
    let names: Vec<&str> = summary.timing.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["00_warmup", "01_3_spikes", "02_2_spikes", "03_3_spikes"]);
    assert!(summary.timing.entries().iter().all(|e| e.real_time_ms.is_some()));
    assert_eq!(kernel.time(), 400.0);

    let stimulators = summary.network.stimulator_ids();
    let origins: Vec<Value> = status_calls(&kernel, "origin")
        .into_iter()
        .map(|(nodes, value)| {
            assert_eq!(nodes, stimulators);
            value
        })
        .collect();
    assert_eq!(origins, vec![json!(0.0), json!(100.0), json!(200.0), json!(300.0)]);

    assert!(sim.sessions().iter().all(|s| s.state() == SessionState::Done));
    assert_eq!(
        kernel.get_status(stimulators[0], "spike_times").unwrap(),
        json!([10.0, 20.0, 30.0])
    );
}

#[test]
fn test_unrecorded_session_pushes_recorder_start() {
    let dir = tempdir().unwrap();
    let mut sim = simulation(&document(&dir.path().join("run"))).unwrap();
    let mut kernel = InMemoryKernel::new();
    let summary = sim.run(&mut kernel).unwrap();

    let starts = status_calls(&kernel, "start");
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].0, summary.network.recorder_ids());
    assert_eq!(starts[0].1, json!(100.0));
}

#[test]
fn test_metadata_written() {
    let dir = tempdir().unwrap();
    let output_dir = dir.path().join("run");
    let mut sim = simulation(&document(&output_dir)).unwrap();
    let mut kernel = InMemoryKernel::new();
    let summary = sim.run(&mut kernel).unwrap();

    let loaded = LoadedRun::load(&output_dir).unwrap();
    assert_eq!(loaded.session_times["03_3_spikes"], (300.0, 400.0));
    assert_eq!(loaded.session_times.len(), 4);
    assert_eq!(loaded.versions.denest, denest_simulation::VERSION);
    assert_eq!(loaded.versions.kernel, kernel.version());
    assert!(loaded.versions.finished_at.is_some());

    let detector = &loaded.recorders["my_spike_detector_l1_l1_exc"];
    assert_eq!(detector.quantities, vec!["spikes".to_string()]);
    assert_eq!(detector.ids.len(), 18);
    assert_eq!(detector.shape, Some([3, 3]));
    assert_eq!(detector.locations.len(), 18);
    assert!(detector.locations.values().any(|loc| *loc == [2, 2, 1]));
    let multimeter = &loaded.recorders["my_multimeter_l1_l1_exc"];
    assert_eq!(multimeter.quantities, vec!["V_m".to_string()]);

    // the tree snapshot carries resolved parameters
    assert_eq!(
        loaded.parameter_tree["network"]["layers"]["l1"]["kernel_params"]["rows"],
        json!(3)
    );
    assert!(output_dir.join("sessions").join("02_2_spikes.json").is_file());

    #[cfg(unix)]
    {
        let link = summary.current_link.unwrap();
        assert_eq!(link, dir.path().join("current"));
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("run"));
    }
}

#[test]
fn test_run_from_file_with_overrides() {
    let dir = tempdir().unwrap();
    let tree_path = dir.path().join("tree.json");
    fs::write(&tree_path, document(&dir.path().join("ignored")).to_string()).unwrap();
    let overrides = RunOverrides {
        output_dir: Some(dir.path().join("override")),
        ..RunOverrides::default()
    };

    let summary = run(&[tree_path], &overrides).unwrap();

    assert_eq!(summary.output_dir, dir.path().join("override"));
    assert!(dir.path().join("override").join("versions.json").is_file());
    assert!(!dir.path().join("ignored").exists());
    assert_eq!(summary.seeds.grng_seed, 6);
}

// ═══════════════════════════════════════════════════════════
// Determinism
// ═══════════════════════════════════════════════════════════

fn proportional_document(output_dir: &Path) -> Value {
    let mut doc = document(output_dir);
    doc["session_models"]["partial"] = json!({"params": {
        "simulation_time": 50.0,
        "unit_changes": [{
            "layer": "l1",
            "population": "l1_exc",
            "proportion": 0.5,
            "params": {"V_m": -60.0}
        }]
    }});
    doc["simulation"]["params"]["sessions"] = json!(["warmup", "partial", "3_spikes"]);
    doc
}

#[test]
fn test_pinned_seeds_reproduce_run() {
    let dir = tempdir().unwrap();
    let mut results = Vec::new();
    for name in ["a", "b"] {
        let mut sim = simulation(&proportional_document(&dir.path().join(name))).unwrap();
        let mut kernel = InMemoryKernel::new();
        let summary = sim.run(&mut kernel).unwrap();
        results.push((summary.timing.intervals(), status_calls(&kernel, "V_m"), kernel.connection_count()));
    }
    assert_eq!(results[0], results[1]);
    let changed = &results[0].1;
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].0.len(), 9);
    assert_eq!(results[0].0, vec![(0.0, 100.0), (100.0, 150.0), (150.0, 250.0)]);
}

#[test]
fn test_second_proportional_change_fails() {
    let dir = tempdir().unwrap();
    let output_dir = dir.path().join("run");
    let mut doc = proportional_document(&output_dir);
    doc["simulation"]["params"]["sessions"] = json!(["partial", "warmup", "partial"]);
    let mut sim = simulation(&doc).unwrap();
    let mut kernel = InMemoryKernel::new();

    let err = sim.run(&mut kernel).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Session(SessionError::RepeatedProportionalChange { ref session, ref layer, .. })
            if session == "02_partial" && layer == "l1"
    ));
    // sessions that completed keep their metadata
    assert!(output_dir.join("sessions").join("00_partial.json").is_file());
    assert!(output_dir.join("sessions").join("01_warmup.json").is_file());
    assert!(!output_dir.join("versions.json").exists());
    assert_eq!(sim.sessions()[2].state(), SessionState::Failed);
}

#[test]
fn test_proportional_change_after_constant_change_on_same_layer_fails() {
    let dir = tempdir().unwrap();
    let mut doc = proportional_document(&dir.path().join("run"));
    doc["session_models"]["depolarize"] = json!({"params": {
        "simulation_time": 10.0,
        "unit_changes": [{"layer": "l1", "params": {"V_m": -65.0}}]
    }});
    doc["simulation"]["params"]["sessions"] = json!(["depolarize", "partial"]);
    let mut sim = simulation(&doc).unwrap();
    let mut kernel = InMemoryKernel::new();

    let err = sim.run(&mut kernel).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Session(SessionError::RepeatedProportionalChange { ref session, ref layer, .. })
            if session == "01_partial" && layer == "l1"
    ));
    assert_eq!(kernel.time(), 10.0);
}

#[test]
fn test_proportional_change_on_untouched_layer_runs() {
    let dir = tempdir().unwrap();
    let mut doc = proportional_document(&dir.path().join("run"));
    doc["simulation"]["params"]["sessions"] = json!(["3_spikes", "partial"]);
    let mut sim = simulation(&doc).unwrap();
    let mut kernel = InMemoryKernel::new();

    let summary = sim.run(&mut kernel).unwrap();
    assert_eq!(summary.timing.intervals(), vec![(0.0, 100.0), (100.0, 150.0)]);
    let changed = status_calls(&kernel, "V_m");
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].0.len(), 9);
    let layers: Vec<&str> = summary.network.changed_layers().collect();
    assert_eq!(layers, vec!["input_layer", "l1"]);
}

// ═══════════════════════════════════════════════════════════
// Failures before any network object exists
// ═══════════════════════════════════════════════════════════

#[test]
fn test_undeclared_model_builds_nothing() {
    let dir = tempdir().unwrap();
    let mut doc = document(&dir.path().join("run"));
    doc["network"]["layers"]["l1"]["params"]["populations"] = json!({"l2_exc": 2});
    let mut sim = simulation(&doc).unwrap();
    let mut kernel = InMemoryKernel::new();

    let err = sim.run(&mut kernel).unwrap_err();
    assert!(matches!(err, SimulationError::Build(_)));
    assert!(kernel.journal().iter().all(|entry| matches!(
        entry.call,
        KernelCall::ResetKernel | KernelCall::SetKernelStatus(_)
    )));
    assert_eq!(kernel.node_count(), 0);
}

#[test]
fn test_kernel_seed_overflow_fails_before_network() {
    let dir = tempdir().unwrap();
    let mut doc = document(&dir.path().join("run"));
    doc["kernel"]["params"]["kernel_seed"] = json!(u64::MAX);
    let mut sim = simulation(&doc).unwrap();
    let mut kernel = InMemoryKernel::new();

    let err = sim.run(&mut kernel).unwrap_err();
    assert!(matches!(err, SimulationError::Kernel(KernelError::InvalidStatus { .. })));
    assert_eq!(kernel.node_count(), 0);
}

#[test]
fn test_unknown_session_model() {
    let dir = tempdir().unwrap();
    let mut doc = document(&dir.path().join("run"));
    doc["simulation"]["params"]["sessions"] = json!(["warmup", "missing"]);
    let err = simulation(&doc).err().unwrap();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::InvalidParameterValue { ref key, .. }) if key == "sessions"
    ));
}

#[test]
fn test_unrecognized_root_child() {
    let dir = tempdir().unwrap();
    let mut doc = document(&dir.path().join("run"));
    doc["plots"] = json!({"params": {}});
    let err = simulation(&doc).err().unwrap();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::UnrecognizedChild { ref child, .. }) if child == "plots"
    ));
}

#[test]
fn test_reserved_kernel_option() {
    let dir = tempdir().unwrap();
    let mut doc = document(&dir.path().join("run"));
    doc["kernel"]["kernel_params"]["data_path"] = json!("/tmp");
    let err = simulation(&doc).err().unwrap();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::ReservedParameter { ref key, .. }) if key == "data_path"
    ));
}

#[test]
fn test_session_clock_mismatch() {
    let dir = tempdir().unwrap();
    let sim = simulation(&document(&dir.path().join("run"))).unwrap();
    let mut kernel = InMemoryKernel::new();
    let mut network = denest_network::NetworkBuilder::new(sim.network_spec().clone())
        .build(&mut kernel)
        .unwrap();
    let spec = sim.sessions()[1].spec().clone();
    let mut session = Session::new(spec, 100.0);
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    let err = session.run(&mut kernel, &mut network, &mut rng).unwrap_err();
    assert!(matches!(err, SessionError::ClockMismatch { expected, actual, .. } if expected == 100.0 && actual == 0.0));
    assert_eq!(session.state(), SessionState::Failed);
}
