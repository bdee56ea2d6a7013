// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Slash-separated node paths (`network/layers/l1`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully-qualified name chain of a node, root first
///
/// The root node has the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    /// Parse a path such as `network/layers/l1`
    ///
    /// Leading, trailing and doubled slashes are ignored, so `""` and `"/"`
    /// both parse to the root.
    pub fn parse(raw: &str) -> Self {
        NodePath(
            raw.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        NodePath(segments)
    }

    /// Structural parent, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(NodePath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last segment; the root is named `root`
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("root")
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` equals `ancestor` or lies below it
    pub fn starts_with(&self, ancestor: &NodePath) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    /// Path relative to `ancestor`, if `self` lies below it
    pub fn strip_prefix(&self, ancestor: &NodePath) -> Option<NodePath> {
        self.0
            .strip_prefix(ancestor.0.as_slice())
            .map(|rest| NodePath(rest.to_vec()))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0.join("/"))
        }
    }
}

impl From<&str> for NodePath {
    fn from(raw: &str) -> Self {
        NodePath::parse(raw)
    }
}

impl From<String> for NodePath {
    fn from(raw: String) -> Self {
        NodePath::parse(&raw)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = NodePath::parse("/network//layers/l1/");
        assert_eq!(path.segments(), &["network", "layers", "l1"]);
        assert_eq!(path.to_string(), "network/layers/l1");
        assert_eq!(NodePath::parse("").to_string(), "/");
    }

    #[test]
    fn test_parent_chain() {
        let path = NodePath::parse("a/b");
        assert_eq!(path.parent(), Some(NodePath::parse("a")));
        assert_eq!(NodePath::parse("a").parent(), Some(NodePath::root()));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn test_prefix_helpers() {
        let layers = NodePath::parse("network/layers");
        let leaf = NodePath::parse("network/layers/input/l1");
        assert!(leaf.starts_with(&layers));
        assert_eq!(leaf.strip_prefix(&layers), Some(NodePath::parse("input/l1")));
        assert_eq!(layers.strip_prefix(&leaf), None);
    }
}
