// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Built-in models of the in-memory kernel

use crate::types::{ElementType, ModelInfo, RecordingMode, Status};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A built-in model plus the bookkeeping the kernel needs for it
pub(crate) struct BuiltinModel {
    pub info: ModelInfo,
    pub receptors: BTreeMap<String, u64>,
    /// Status entries restored by `reset_network`
    pub state_variables: &'static [&'static str],
}

fn status(entries: &[(&str, Value)]) -> Status {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn builtin(
    name: &str,
    element_type: ElementType,
    recording_mode: Option<RecordingMode>,
    defaults: Status,
    receptors: &[(&str, u64)],
    state_variables: &'static [&'static str],
) -> BuiltinModel {
    BuiltinModel {
        info: ModelInfo {
            name: name.to_string(),
            base: name.to_string(),
            element_type,
            recording_mode,
            defaults,
        },
        receptors: receptors
            .iter()
            .map(|(receptor, port)| (receptor.to_string(), *port))
            .collect(),
        state_variables,
    }
}

fn device_defaults(extra: &[(&str, Value)]) -> Status {
    let mut defaults = status(&[
        ("origin", json!(0.0)),
        ("start", json!(0.0)),
        ("stop", Value::Null),
    ]);
    defaults.extend(status(extra));
    defaults
}

fn synapse_defaults(extra: &[(&str, Value)]) -> Status {
    let mut defaults = status(&[
        ("weight", json!(1.0)),
        ("delay", json!(1.0)),
        ("receptor_type", json!(0)),
        ("weight_recorder", Value::Null),
    ]);
    defaults.extend(status(extra));
    defaults
}

pub(crate) fn builtin_models() -> Vec<BuiltinModel> {
    vec![
        builtin(
            "iaf_psc_alpha",
            ElementType::Neuron,
            None,
            status(&[
                ("V_m", json!(-70.0)),
                ("E_L", json!(-70.0)),
                ("C_m", json!(250.0)),
                ("tau_m", json!(10.0)),
                ("t_ref", json!(2.0)),
                ("V_th", json!(-55.0)),
                ("V_reset", json!(-70.0)),
                ("I_e", json!(0.0)),
            ]),
            &[],
            &["V_m"],
        ),
        builtin(
            "ht_neuron",
            ElementType::Neuron,
            None,
            status(&[
                ("V_m", json!(-70.0)),
                ("theta", json!(-51.0)),
                ("theta_eq", json!(-51.0)),
                ("tau_m", json!(16.0)),
                ("g_peak_AMPA", json!(0.1)),
                ("g_peak_NMDA", json!(0.075)),
                ("g_peak_GABA_A", json!(0.33)),
                ("g_peak_GABA_B", json!(0.0132)),
                ("g_KL", json!(1.0)),
                ("g_NaL", json!(0.2)),
            ]),
            &[("AMPA", 1), ("NMDA", 2), ("GABA_A", 3), ("GABA_B", 4)],
            &["V_m", "theta"],
        ),
        builtin("parrot_neuron", ElementType::Neuron, None, Status::new(), &[], &[]),
        builtin(
            "spike_generator",
            ElementType::Stimulator,
            None,
            device_defaults(&[("spike_times", json!([])), ("spike_weights", json!([]))]),
            &[],
            &[],
        ),
        builtin(
            "poisson_generator",
            ElementType::Stimulator,
            None,
            device_defaults(&[("rate", json!(0.0))]),
            &[],
            &[],
        ),
        builtin(
            "spike_detector",
            ElementType::Recorder,
            Some(RecordingMode::Events),
            device_defaults(&[
                ("label", json!("")),
                ("n_events", json!(0)),
                ("record_to", json!(["memory"])),
                ("withgid", json!(true)),
                ("withtime", json!(true)),
            ]),
            &[],
            &["n_events"],
        ),
        builtin(
            "multimeter",
            ElementType::Recorder,
            Some(RecordingMode::Sampled),
            device_defaults(&[
                ("label", json!("")),
                ("n_events", json!(0)),
                ("interval", json!(1.0)),
                ("record_from", json!([])),
                ("record_to", json!(["memory"])),
                ("withgid", json!(true)),
                ("withtime", json!(true)),
            ]),
            &[],
            &["n_events"],
        ),
        builtin(
            "weight_recorder",
            ElementType::Recorder,
            Some(RecordingMode::Synaptic),
            device_defaults(&[
                ("label", json!("")),
                ("n_events", json!(0)),
                ("record_to", json!(["memory"])),
                ("withgid", json!(true)),
                ("withtime", json!(true)),
            ]),
            &[],
            &["n_events"],
        ),
        builtin(
            "static_synapse",
            ElementType::Synapse,
            None,
            synapse_defaults(&[]),
            &[],
            &[],
        ),
        builtin(
            "ht_synapse",
            ElementType::Synapse,
            None,
            synapse_defaults(&[("U", json!(0.5)), ("tau_P", json!(500.0)), ("P", json!(1.0))]),
            &[],
            &[],
        ),
    ]
}
