// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Parameter tree documents.

A document is a mapping. Four keys are reserved:

- `params`: validated parameters of the node
- `kernel_params`: options passed through to the kernel
- `inherits`: path of the node to inherit from (`network/layers/base`)
- `include`: list of documents, relative to the including file, merged
  under this node

Every other key is a child node. Documents are JSON (`.json`) or TOML
(`.toml`).

Included content never overrides the including document, and earlier
includes take precedence over later ones.
*/

use crate::error::{ConfigurationError, ParamsResult};
use crate::path::NodePath;
use crate::tree::{ParamTree, INCLUDE_KEY, INHERITS_KEY, KERNEL_PARAMS_KEY, PARAMS_KEY};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load one tree from a document, following includes
pub fn load_tree(path: &Path) -> ParamsResult<ParamTree> {
    info!(target: "denest-params", "📄 Loading parameter tree from {}", path.display());
    let mut stack = Vec::new();
    let document = expand_document(path, &mut stack)?;
    tree_from_value(&document, &path.display().to_string())
}

/// Load and merge several trees, earlier paths taking precedence
pub fn load_trees(paths: &[PathBuf]) -> ParamsResult<ParamTree> {
    let trees = paths
        .iter()
        .map(|path| load_tree(path))
        .collect::<ParamsResult<Vec<_>>>()?;
    Ok(ParamTree::merge_trees(&trees))
}

/// Parse a document from text, by file extension
pub fn parse_document(path: &Path, content: &str) -> ParamsResult<Value> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "json" => serde_json::from_str(content).map_err(|e| ConfigurationError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        "toml" => {
            let parsed: toml::Value = toml::from_str(content).map_err(|e| ConfigurationError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            serde_json::to_value(parsed).map_err(|e| ConfigurationError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
        other => Err(ConfigurationError::InvalidDocument {
            path: path.display().to_string(),
            reason: format!("unsupported document extension `{}` (expected json or toml)", other),
        }),
    }
}

fn read_document(path: &Path) -> ParamsResult<Value> {
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(path, &content)
}

/// Read `path` and splice its includes in, recursively
fn expand_document(path: &Path, stack: &mut Vec<PathBuf>) -> ParamsResult<Value> {
    let canonical = path.canonicalize().map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(position) = stack.iter().position(|seen| *seen == canonical) {
        let mut cycle: Vec<String> = stack[position..]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        cycle.push(canonical.display().to_string());
        return Err(ConfigurationError::IncludeCycle { cycle });
    }

    stack.push(canonical.clone());
    let document = read_document(&canonical)?;
    let base_dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
    let expanded = expand_includes(document, &base_dir, &canonical, stack)?;
    stack.pop();
    Ok(expanded)
}

/// Expand `include` lists at every level of `value`
fn expand_includes(
    value: Value,
    base_dir: &Path,
    source: &Path,
    stack: &mut Vec<PathBuf>,
) -> ParamsResult<Value> {
    let Value::Object(mut map) = value else {
        return Err(ConfigurationError::InvalidDocument {
            path: source.display().to_string(),
            reason: "tree nodes must be mappings".to_string(),
        });
    };

    let includes = match map.remove(INCLUDE_KEY) {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(Value::String(single)) => vec![Value::String(single)],
        Some(_) => {
            return Err(ConfigurationError::InvalidDocument {
                path: source.display().to_string(),
                reason: format!("`{}` must be a list of paths", INCLUDE_KEY),
            })
        }
    };

    let mut expanded = Map::new();
    for (key, child) in map {
        if is_reserved(&key) {
            expanded.insert(key, child);
        } else {
            expanded.insert(key, expand_includes(child, base_dir, source, stack)?);
        }
    }

    let mut merged = Value::Object(expanded);
    for include in includes {
        let Some(relative) = include.as_str() else {
            return Err(ConfigurationError::InvalidDocument {
                path: source.display().to_string(),
                reason: format!("`{}` entries must be strings", INCLUDE_KEY),
            });
        };
        debug!(target: "denest-params", "  including {} from {}", relative, source.display());
        let included = expand_document(&base_dir.join(relative), stack)?;
        merge_documents(&mut merged, &included);
    }
    Ok(merged)
}

fn is_reserved(key: &str) -> bool {
    matches!(key, PARAMS_KEY | KERNEL_PARAMS_KEY | INHERITS_KEY | INCLUDE_KEY)
}

/// Merge node `lower` into node `upper`, keeping everything `upper` defines
///
/// Parameter values are atomic: a key present in both groups keeps the
/// upper value whole, even when it is a mapping.
fn merge_documents(upper: &mut Value, lower: &Value) {
    let (Value::Object(upper), Value::Object(lower)) = (upper, lower) else {
        return;
    };
    for (key, lower_value) in lower {
        let Some(upper_value) = upper.get_mut(key) else {
            upper.insert(key.clone(), lower_value.clone());
            continue;
        };
        match key.as_str() {
            INHERITS_KEY => {}
            PARAMS_KEY | KERNEL_PARAMS_KEY => {
                if let (Value::Object(upper_group), Value::Object(lower_group)) =
                    (upper_value, lower_value)
                {
                    for (name, value) in lower_group {
                        upper_group
                            .entry(name.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            _ => merge_documents(upper_value, lower_value),
        }
    }
}

/// Build a tree from an already-expanded document
///
/// `source` names the document in error messages.
pub fn tree_from_value(document: &Value, source: &str) -> ParamsResult<ParamTree> {
    let mut tree = ParamTree::new();
    insert_node(&mut tree, &NodePath::root(), document, source)?;
    Ok(tree)
}

fn insert_node(tree: &mut ParamTree, path: &NodePath, value: &Value, source: &str) -> ParamsResult<()> {
    let invalid = |reason: String| ConfigurationError::InvalidDocument {
        path: source.to_string(),
        reason,
    };
    let Value::Object(map) = value else {
        return Err(invalid(format!("node `{}` must be a mapping", path)));
    };

    tree.ensure_node(path)?;
    for (key, child) in map {
        match key.as_str() {
            PARAMS_KEY | KERNEL_PARAMS_KEY => {
                let Value::Object(entries) = child else {
                    return Err(invalid(format!("`{}` of node `{}` must be a mapping", key, path)));
                };
                for (name, entry) in entries {
                    if key == PARAMS_KEY {
                        tree.set_param(path, name, entry.clone())?;
                    } else {
                        tree.set_kernel_param(path, name, entry.clone())?;
                    }
                }
            }
            INHERITS_KEY => {
                let Some(target) = child.as_str() else {
                    return Err(invalid(format!("`{}` of node `{}` must be a node path", key, path)));
                };
                tree.set_inherits(path, NodePath::parse(target))?;
            }
            INCLUDE_KEY => {
                return Err(invalid(format!("unexpanded `{}` at node `{}`", key, path)));
            }
            _ => insert_node(tree, &path.child(key), child, source)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_tree_from_value() {
        let tree = tree_from_value(
            &json!({
                "params": {"top": 1},
                "network": {
                    "layers": {
                        "l1": {"kernel_params": {"rows": 2}, "inherits": "network/base"}
                    },
                    "base": {"params": {"populations": {"iaf": 1}}}
                }
            }),
            "inline",
        )
        .unwrap();
        let l1 = tree.node(&NodePath::parse("network/layers/l1")).unwrap();
        assert_eq!(l1.kernel_params["rows"], json!(2));
        assert_eq!(l1.inherits, Some(NodePath::parse("network/base")));
        assert_eq!(tree.node(&NodePath::root()).unwrap().params["top"], json!(1));
    }

    #[test]
    fn test_non_mapping_node_rejected() {
        let err = tree_from_value(&json!({"network": 3}), "inline").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDocument { .. }));
    }

    #[test]
    fn test_includes_merge_under_own_content() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "models.json",
            r#"{"neuron_models": {"n1": {"params": {"model": "iaf_psc_alpha", "x": 1}}}}"#,
        );
        write(
            dir.path(),
            "more.toml",
            "[neuron_models.n1.params]\nx = 99\ny = 2\n",
        );
        let root = write(
            dir.path(),
            "tree.json",
            r#"{"network": {"include": ["models.json", "more.toml"],
                "neuron_models": {"n1": {"params": {"z": 3}}}}}"#,
        );

        let tree = load_tree(&root).unwrap();
        let n1 = tree.node(&NodePath::parse("network/neuron_models/n1")).unwrap();
        assert_eq!(n1.params["model"], json!("iaf_psc_alpha"));
        assert_eq!(n1.params["x"], json!(1));
        assert_eq!(n1.params["y"], json!(2));
        assert_eq!(n1.params["z"], json!(3));
    }

    #[test]
    fn test_include_cycle() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"include": ["b.json"]}"#);
        write(dir.path(), "b.json", r#"{"include": ["a.json"]}"#);
        let err = load_tree(&dir.path().join("a.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::IncludeCycle { ref cycle } if cycle.len() == 3));
    }

    #[test]
    fn test_load_trees_first_wins() {
        let dir = tempdir().unwrap();
        let first = write(dir.path(), "first.json", r#"{"simulation": {"params": {"output_dir": "a"}}}"#);
        let second = write(
            dir.path(),
            "second.json",
            r#"{"simulation": {"params": {"output_dir": "b", "sessions": ["s"]}}}"#,
        );
        let tree = load_trees(&[first, second]).unwrap();
        let sim = tree.node(&NodePath::parse("simulation")).unwrap();
        assert_eq!(sim.params["output_dir"], json!("a"));
        assert_eq!(sim.params["sessions"], json!(["s"]));
    }

    #[test]
    fn test_unknown_extension() {
        let err = parse_document(Path::new("tree.yaml"), "a: 1").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDocument { .. }));
    }
}
