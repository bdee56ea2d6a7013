// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Parameter tree arena.

Nodes live in a flat map keyed by [`NodePath`]. Structure (parent/child) is
implied by the paths. Inheritance is a separate, explicit reference stored on
each node and resolved by [`crate::TreeMerger`].

Once a tree is frozen, every mutation fails with
[`ConfigurationError::ImmutableParameter`].
*/

use crate::error::{ConfigurationError, ParamsResult};
use crate::path::NodePath;
use crate::ParamMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Document key holding validated parameters
pub const PARAMS_KEY: &str = "params";
/// Document key holding options passed through to the kernel
pub const KERNEL_PARAMS_KEY: &str = "kernel_params";
/// Document key holding the inheritance reference
pub const INHERITS_KEY: &str = "inherits";
/// Document key listing included documents
pub const INCLUDE_KEY: &str = "include";

/// Which parameter group of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamGroup {
    Params,
    KernelParams,
}

/// One point in the parameter tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamNode {
    pub params: ParamMap,
    pub kernel_params: ParamMap,
    /// Explicit inheritance reference; falls back to the structural parent
    pub inherits: Option<NodePath>,
}

impl ParamNode {
    pub fn group(&self, group: ParamGroup) -> &ParamMap {
        match group {
            ParamGroup::Params => &self.params,
            ParamGroup::KernelParams => &self.kernel_params,
        }
    }

    fn group_mut(&mut self, group: ParamGroup) -> &mut ParamMap {
        match group {
            ParamGroup::Params => &mut self.params,
            ParamGroup::KernelParams => &mut self.kernel_params,
        }
    }
}

/// Arena of parameter nodes keyed by path
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTree {
    nodes: BTreeMap<NodePath, ParamNode>,
    frozen: bool,
}

impl Default for ParamTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamTree {
    /// Tree holding only an empty root
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodePath::root(), ParamNode::default());
        Self {
            nodes,
            frozen: false,
        }
    }

    fn check_mutable(&self, path: &NodePath, key: &str) -> ParamsResult<()> {
        if self.frozen {
            return Err(ConfigurationError::ImmutableParameter {
                object: path.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Get or create the node at `path`, creating missing ancestors
    pub fn ensure_node(&mut self, path: &NodePath) -> ParamsResult<&mut ParamNode> {
        if !self.nodes.contains_key(path) {
            self.check_mutable(path, "<node>")?;
            let mut current = NodePath::root();
            for segment in path.segments() {
                current = current.child(segment);
                self.nodes.entry(current.clone()).or_default();
            }
        }
        self.nodes
            .get_mut(path)
            .ok_or_else(|| ConfigurationError::UnknownNode(path.to_string()))
    }

    /// Set one parameter of a node (the node is created if needed)
    pub fn set(
        &mut self,
        path: &NodePath,
        group: ParamGroup,
        key: &str,
        value: Value,
    ) -> ParamsResult<()> {
        self.check_mutable(path, key)?;
        self.ensure_node(path)?
            .group_mut(group)
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_param(&mut self, path: &NodePath, key: &str, value: Value) -> ParamsResult<()> {
        self.set(path, ParamGroup::Params, key, value)
    }

    pub fn set_kernel_param(&mut self, path: &NodePath, key: &str, value: Value) -> ParamsResult<()> {
        self.set(path, ParamGroup::KernelParams, key, value)
    }

    pub fn set_inherits(&mut self, path: &NodePath, target: NodePath) -> ParamsResult<()> {
        self.check_mutable(path, INHERITS_KEY)?;
        self.ensure_node(path)?.inherits = Some(target);
        Ok(())
    }

    /// Seal the tree; later mutations fail
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn node(&self, path: &NodePath) -> Option<&ParamNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1 && self.nodes.values().all(|n| *n == ParamNode::default())
    }

    /// All node paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &NodePath> {
        self.nodes.keys()
    }

    /// Direct children of `path`, sorted by name
    pub fn children(&self, path: &NodePath) -> Vec<NodePath> {
        self.nodes
            .keys()
            .filter(|candidate| candidate.depth() == path.depth() + 1 && candidate.starts_with(path))
            .cloned()
            .collect()
    }

    pub fn child_names(&self, path: &NodePath) -> Vec<String> {
        self.children(path)
            .iter()
            .map(|child| child.name().to_string())
            .collect()
    }

    fn has_children(&self, path: &NodePath) -> bool {
        self.nodes
            .keys()
            .any(|candidate| candidate.depth() == path.depth() + 1 && candidate.starts_with(path))
    }

    /// Leaves strictly below `under`, sorted by path
    ///
    /// A node without children counts as a leaf. `under` itself is never
    /// returned, even when it has no children.
    pub fn leaves(&self, under: &NodePath) -> Vec<NodePath> {
        self.nodes
            .keys()
            .filter(|path| path.depth() > under.depth() && path.starts_with(under))
            .filter(|path| !self.has_children(path))
            .cloned()
            .collect()
    }

    /// Merge several trees, earlier trees taking precedence
    ///
    /// Nodes present in only one tree are copied. For nodes present in
    /// several trees, each parameter key and the inheritance reference are
    /// taken from the first tree that defines them.
    pub fn merge_trees(trees: &[ParamTree]) -> ParamTree {
        let mut merged = ParamTree::new();
        for tree in trees {
            for (path, node) in &tree.nodes {
                let target = merged.nodes.entry(path.clone()).or_default();
                for (key, value) in &node.params {
                    target.params.entry(key.clone()).or_insert_with(|| value.clone());
                }
                for (key, value) in &node.kernel_params {
                    target
                        .kernel_params
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                if target.inherits.is_none() {
                    target.inherits = node.inherits.clone();
                }
            }
        }
        merged
    }

    /// Nested document form of the tree, as read by the loader
    ///
    /// Used for the run snapshot. Empty parameter groups are omitted.
    pub fn to_value(&self) -> Value {
        self.node_to_value(&NodePath::root())
    }

    fn node_to_value(&self, path: &NodePath) -> Value {
        let mut doc = Map::new();
        if let Some(node) = self.nodes.get(path) {
            if !node.params.is_empty() {
                doc.insert(PARAMS_KEY.to_string(), map_to_value(&node.params));
            }
            if !node.kernel_params.is_empty() {
                doc.insert(KERNEL_PARAMS_KEY.to_string(), map_to_value(&node.kernel_params));
            }
            if let Some(target) = &node.inherits {
                doc.insert(INHERITS_KEY.to_string(), Value::String(target.to_string()));
            }
        }
        for child in self.children(path) {
            doc.insert(child.name().to_string(), self.node_to_value(&child));
        }
        Value::Object(doc)
    }
}

pub(crate) fn map_to_value(map: &ParamMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_node_creates_ancestors() {
        let mut tree = ParamTree::new();
        tree.set_param(&NodePath::parse("a/b/c"), "x", json!(1)).unwrap();
        assert!(tree.contains(&NodePath::parse("a")));
        assert!(tree.contains(&NodePath::parse("a/b")));
        assert_eq!(tree.leaves(&NodePath::root()), vec![NodePath::parse("a/b/c")]);
    }

    #[test]
    fn test_frozen_tree_rejects_mutation() {
        let mut tree = ParamTree::new();
        tree.set_param(&NodePath::parse("a"), "x", json!(1)).unwrap();
        tree.freeze();
        let err = tree
            .set_param(&NodePath::parse("a"), "x", json!(2))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ImmutableParameter { ref key, .. } if key == "x"));
        assert_eq!(tree.node(&NodePath::parse("a")).unwrap().params["x"], json!(1));
    }

    #[test]
    fn test_merge_trees_earlier_wins() {
        let mut first = ParamTree::new();
        first.set_param(&NodePath::parse("a"), "x", json!(1)).unwrap();
        let mut second = ParamTree::new();
        second.set_param(&NodePath::parse("a"), "x", json!(2)).unwrap();
        second.set_param(&NodePath::parse("a"), "y", json!(3)).unwrap();
        second.set_param(&NodePath::parse("b"), "z", json!(4)).unwrap();

        let merged = ParamTree::merge_trees(&[first, second]);
        let a = merged.node(&NodePath::parse("a")).unwrap();
        assert_eq!(a.params["x"], json!(1));
        assert_eq!(a.params["y"], json!(3));
        assert_eq!(merged.node(&NodePath::parse("b")).unwrap().params["z"], json!(4));
    }

    #[test]
    fn test_to_value_snapshot() {
        let mut tree = ParamTree::new();
        tree.set_param(&NodePath::parse("net/l1"), "n", json!(2)).unwrap();
        tree.set_kernel_param(&NodePath::parse("net/l1"), "rows", json!(3)).unwrap();
        tree.set_inherits(&NodePath::parse("net/l2"), NodePath::parse("net/l1")).unwrap();
        assert_eq!(
            tree.to_value(),
            json!({
                "net": {
                    "l1": {"params": {"n": 2}, "kernel_params": {"rows": 3}},
                    "l2": {"inherits": "net/l1"}
                }
            })
        );
    }
}
