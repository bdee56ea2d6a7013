// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property tests for inheritance resolution
//!
//! Trees are generated as a single chain `n0/n1/.../nk`, each node holding a
//! random subset of a small key space, so overlapping keys are common.

use denest_params::{ConfigurationError, NodePath, ParamTree, TreeMerger};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

const KEYS: &[&str] = &["a", "b", "c", "d", "e"];

fn chain_path(depth: usize) -> NodePath {
    let mut path = NodePath::root();
    for level in 0..depth {
        path = path.child(&format!("n{}", level));
    }
    path
}

fn level_params() -> impl Strategy<Value = BTreeMap<String, i64>> {
    proptest::collection::btree_map(
        proptest::sample::select(KEYS).prop_map(str::to_string),
        any::<i64>(),
        0..KEYS.len(),
    )
}

fn build_chain(levels: &[BTreeMap<String, i64>]) -> ParamTree {
    let mut tree = ParamTree::new();
    for (depth, params) in levels.iter().enumerate() {
        let path = chain_path(depth);
        tree.ensure_node(&path).unwrap();
        for (key, value) in params {
            tree.set_param(&path, key, json!(value)).unwrap();
        }
    }
    tree
}

// ═══════════════════════════════════════════════════════════
// Own values win, otherwise the nearest ancestor's value
// ═══════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prop_nearest_definition_wins(levels in proptest::collection::vec(level_params(), 1..6)) {
        let tree = build_chain(&levels);
        let mut merger = TreeMerger::new(&tree);

        for depth in 0..levels.len() {
            let resolved = merger.resolve(&chain_path(depth)).unwrap();
            for key in KEYS {
                let expected = levels[..=depth]
                    .iter()
                    .rev()
                    .find_map(|params| params.get(*key));
                match expected {
                    Some(value) => prop_assert_eq!(resolved.params.get(*key), Some(&json!(value))),
                    None => prop_assert!(!resolved.params.contains_key(*key)),
                }
            }
        }
    }

    #[test]
    fn prop_resolution_is_order_independent(levels in proptest::collection::vec(level_params(), 1..6)) {
        let tree = build_chain(&levels);
        let deepest = chain_path(levels.len() - 1);

        let mut top_down = TreeMerger::new(&tree);
        top_down.resolve_all().unwrap();
        let a = top_down.resolve(&deepest).unwrap();

        let mut leaf_first = TreeMerger::new(&tree);
        let b = leaf_first.resolve(&deepest).unwrap();

        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_cycles_always_fail(len in 2usize..6) {
        let mut tree = ParamTree::new();
        for i in 0..len {
            let node = NodePath::parse(&format!("c{}", i));
            let next = NodePath::parse(&format!("c{}", (i + 1) % len));
            tree.set_param(&node, "x", json!(i)).unwrap();
            tree.set_inherits(&node, next).unwrap();
        }

        let mut merger = TreeMerger::new(&tree);
        for i in 0..len {
            let result = merger.resolve(&NodePath::parse(&format!("c{}", i)));
            let is_cycle = matches!(result, Err(ConfigurationError::CyclicInheritance { .. }));
            prop_assert!(is_cycle);
        }
        prop_assert_eq!(merger.merge_count(), 0);
    }
}

#[test]
fn test_node_feeding_into_cycle_fails_too() {
    let mut tree = ParamTree::new();
    tree.set_inherits(&NodePath::parse("x"), NodePath::parse("y")).unwrap();
    tree.set_inherits(&NodePath::parse("y"), NodePath::parse("x")).unwrap();
    tree.set_inherits(&NodePath::parse("z"), NodePath::parse("x")).unwrap();

    let mut merger = TreeMerger::new(&tree);
    assert!(matches!(
        merger.resolve(&NodePath::parse("z")),
        Err(ConfigurationError::CyclicInheritance { .. })
    ));
    // Unrelated nodes still resolve
    assert!(merger.resolve(&NodePath::root()).is_ok());
}
