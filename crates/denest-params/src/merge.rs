// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Inheritance resolution.

Every node has at most one inheritance pointer: its explicit `inherits`
reference when declared, otherwise its structural parent. Resolving a node
means resolving its pointer first and overlaying the node's own keys on top,
own values winning.

Resolution walks the pointer chain up front, before any merging happens, so a
cycle is reported before a single partial result exists. Resolved nodes are
memoized: each node is merged at most once per [`TreeMerger`].
*/

use crate::error::{ConfigurationError, ParamsResult};
use crate::path::NodePath;
use crate::tree::{ParamNode, ParamTree};
use crate::ParamMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

/// Both merged parameter groups of one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedNode {
    pub params: ParamMap,
    pub kernel_params: ParamMap,
}

/// Memoizing resolver over a parameter tree
pub struct TreeMerger<'a> {
    tree: &'a ParamTree,
    memo: HashMap<NodePath, Arc<ResolvedNode>>,
    merges: usize,
}

impl<'a> TreeMerger<'a> {
    pub fn new(tree: &'a ParamTree) -> Self {
        Self {
            tree,
            memo: HashMap::new(),
            merges: 0,
        }
    }

    pub fn tree(&self) -> &'a ParamTree {
        self.tree
    }

    /// Number of node merges performed so far
    pub fn merge_count(&self) -> usize {
        self.merges
    }

    fn node(&self, path: &NodePath) -> ParamsResult<&'a ParamNode> {
        self.tree
            .node(path)
            .ok_or_else(|| ConfigurationError::UnknownNode(path.to_string()))
    }

    /// Inheritance pointer of `path`, checked to exist
    fn pointer(&self, path: &NodePath) -> ParamsResult<Option<NodePath>> {
        let node = self.node(path)?;
        match &node.inherits {
            Some(target) => {
                if !self.tree.contains(target) {
                    return Err(ConfigurationError::UnknownInheritanceTarget {
                        node: path.to_string(),
                        target: target.to_string(),
                    });
                }
                Ok(Some(target.clone()))
            }
            None => Ok(path.parent()),
        }
    }

    /// Resolve one node against its whole inheritance chain
    pub fn resolve(&mut self, path: &NodePath) -> ParamsResult<Arc<ResolvedNode>> {
        if let Some(done) = self.memo.get(path) {
            return Ok(done.clone());
        }

        // Walk the chain until a memoized node or the end of the chain,
        // refusing to visit any node twice.
        let mut chain: Vec<NodePath> = vec![path.clone()];
        let mut base: Option<Arc<ResolvedNode>> = None;
        let mut cursor = path.clone();
        while let Some(next) = self.pointer(&cursor)? {
            if let Some(position) = chain.iter().position(|visited| *visited == next) {
                let mut cycle: Vec<String> = chain[position..].iter().map(|p| p.to_string()).collect();
                cycle.push(next.to_string());
                return Err(ConfigurationError::CyclicInheritance { cycle });
            }
            if let Some(done) = self.memo.get(&next) {
                base = Some(done.clone());
                break;
            }
            chain.push(next.clone());
            cursor = next;
        }

        // Merge from the far end of the chain back to `path`.
        let mut resolved = base.map(|b| (*b).clone()).unwrap_or_default();
        for link in chain.iter().rev() {
            let node = self.node(link)?;
            for (key, value) in &node.params {
                resolved.params.insert(key.clone(), value.clone());
            }
            for (key, value) in &node.kernel_params {
                resolved.kernel_params.insert(key.clone(), value.clone());
            }
            self.merges += 1;
            trace!(target: "denest-params", "resolved node `{}`", link);
            self.memo.insert(link.clone(), Arc::new(resolved.clone()));
        }

        self.memo
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownNode(path.to_string()))
    }

    /// Resolve every leaf strictly below `under`
    pub fn resolve_leaves(
        &mut self,
        under: &NodePath,
    ) -> ParamsResult<BTreeMap<NodePath, Arc<ResolvedNode>>> {
        let leaves = self.tree.leaves(under);
        let mut resolved = BTreeMap::new();
        for leaf in leaves {
            let node = self.resolve(&leaf)?;
            resolved.insert(leaf, node);
        }
        Ok(resolved)
    }

    /// Resolve every node of the tree
    ///
    /// Fails on the first cycle found; no partial map is returned.
    pub fn resolve_all(&mut self) -> ParamsResult<BTreeMap<NodePath, Arc<ResolvedNode>>> {
        let paths: Vec<NodePath> = self.tree.paths().cloned().collect();
        let mut resolved = BTreeMap::new();
        for path in paths {
            let node = self.resolve(&path)?;
            resolved.insert(path, node);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(raw: &str) -> NodePath {
        NodePath::parse(raw)
    }

    #[test]
    fn test_structural_inheritance() {
        let mut tree = ParamTree::new();
        tree.set_param(&p("network"), "a", json!(1)).unwrap();
        tree.set_param(&p("network"), "b", json!(1)).unwrap();
        tree.set_param(&p("network/layers"), "b", json!(2)).unwrap();
        tree.set_param(&p("network/layers/l1"), "c", json!(3)).unwrap();

        let mut merger = TreeMerger::new(&tree);
        let l1 = merger.resolve(&p("network/layers/l1")).unwrap();
        assert_eq!(l1.params["a"], json!(1));
        assert_eq!(l1.params["b"], json!(2));
        assert_eq!(l1.params["c"], json!(3));
    }

    #[test]
    fn test_explicit_reference_replaces_parent() {
        let mut tree = ParamTree::new();
        tree.set_param(&p("models/base"), "tau", json!(10.0)).unwrap();
        tree.set_param(&p("models"), "from_parent", json!(true)).unwrap();
        tree.set_param(&p("layers"), "only_layers", json!(true)).unwrap();
        tree.set_param(&p("layers/l1"), "rows", json!(4)).unwrap();
        tree.set_inherits(&p("layers/l1"), p("models/base")).unwrap();

        let mut merger = TreeMerger::new(&tree);
        let l1 = merger.resolve(&p("layers/l1")).unwrap();
        assert_eq!(l1.params["tau"], json!(10.0));
        assert_eq!(l1.params["from_parent"], json!(true));
        assert_eq!(l1.params["rows"], json!(4));
        assert!(!l1.params.contains_key("only_layers"));
    }

    #[test]
    fn test_memoized_merges() {
        let mut tree = ParamTree::new();
        tree.set_param(&p("a/b/c"), "x", json!(1)).unwrap();
        tree.set_param(&p("a/b/d"), "x", json!(2)).unwrap();

        let mut merger = TreeMerger::new(&tree);
        merger.resolve_all().unwrap();
        // root, a, a/b, a/b/c, a/b/d: one merge each
        assert_eq!(merger.merge_count(), 5);
        merger.resolve(&p("a/b/c")).unwrap();
        assert_eq!(merger.merge_count(), 5);
    }

    #[test]
    fn test_cycle_detected() {
        let mut tree = ParamTree::new();
        tree.set_inherits(&p("x"), p("y")).unwrap();
        tree.set_inherits(&p("y"), p("x")).unwrap();

        let mut merger = TreeMerger::new(&tree);
        match merger.resolve(&p("x")) {
            Err(ConfigurationError::CyclicInheritance { cycle }) => {
                assert_eq!(cycle, vec!["x", "y", "x"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(merger.merge_count(), 0);
    }

    #[test]
    fn test_inheriting_own_descendant_is_a_cycle() {
        let mut tree = ParamTree::new();
        tree.set_param(&p("a/b"), "x", json!(1)).unwrap();
        tree.set_inherits(&p("a"), p("a/b")).unwrap();

        let mut merger = TreeMerger::new(&tree);
        assert!(matches!(
            merger.resolve(&p("a/b")),
            Err(ConfigurationError::CyclicInheritance { .. })
        ));
    }

    #[test]
    fn test_unknown_target() {
        let mut tree = ParamTree::new();
        tree.set_inherits(&p("a"), p("missing")).unwrap();
        let mut merger = TreeMerger::new(&tree);
        assert!(matches!(
            merger.resolve(&p("a")),
            Err(ConfigurationError::UnknownInheritanceTarget { .. })
        ));
    }
}
