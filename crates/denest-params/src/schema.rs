// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Validated parameter objects.

A [`Schema`] declares which keys an object accepts: mandatory keys, optional
keys with a default, and reserved keys that the system sets itself. Validating
a raw mapping against it yields an immutable [`ResolvedParams`].

Unknown keys are always rejected. A typo in a parameter tree must fail loudly
instead of turning into a silent no-op.
*/

use crate::error::{ConfigurationError, ParamsResult};
use crate::ParamMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Declared keys for one kind of object
#[derive(Debug, Clone, Default)]
pub struct Schema {
    mandatory: BTreeSet<String>,
    optional: BTreeMap<String, Value>,
    reserved: BTreeSet<String>,
    open: bool,
}

impl Schema {
    /// Strict schema accepting no keys until some are declared
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema accepting any key that is not reserved
    ///
    /// Used for option groups whose recognized keys belong to the kernel.
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    pub fn mandatory(mut self, key: &str) -> Self {
        self.mandatory.insert(key.to_string());
        self
    }

    pub fn optional(mut self, key: &str, default: impl Into<Value>) -> Self {
        self.optional.insert(key.to_string(), default.into());
        self
    }

    pub fn reserved(mut self, key: &str) -> Self {
        self.reserved.insert(key.to_string());
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn recognizes(&self, key: &str) -> bool {
        self.open || self.mandatory.contains(key) || self.optional.contains_key(key)
    }

    /// Validate `raw` and fill defaults
    ///
    /// Checks run in a fixed order (reserved, then unrecognized, then
    /// missing) over sorted keys, so the reported error for a given input is
    /// always the same.
    pub fn validate(&self, object: &str, raw: &ParamMap) -> ParamsResult<ResolvedParams> {
        for key in raw.keys() {
            if self.reserved.contains(key) {
                return Err(ConfigurationError::ReservedParameter {
                    object: object.to_string(),
                    key: key.clone(),
                });
            }
        }
        for key in raw.keys() {
            if !self.recognizes(key) {
                return Err(ConfigurationError::UnrecognizedParameter {
                    object: object.to_string(),
                    key: key.clone(),
                });
            }
        }
        for key in &self.mandatory {
            if !raw.contains_key(key) {
                return Err(ConfigurationError::MissingParameter {
                    object: object.to_string(),
                    key: key.clone(),
                });
            }
        }

        let mut values = raw.clone();
        let mut defaults_used = BTreeSet::new();
        for (key, default) in &self.optional {
            if !values.contains_key(key) {
                debug!(
                    target: "denest-params",
                    "`{}`: using default value for optional parameter `{}`: {}",
                    object, key, default
                );
                values.insert(key.clone(), default.clone());
                defaults_used.insert(key.clone());
            }
        }

        Ok(ResolvedParams {
            object: object.to_string(),
            values,
            defaults_used,
        })
    }
}

/// Immutable, fully-defaulted parameter set of one object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParams {
    object: String,
    values: ParamMap,
    #[serde(skip)]
    defaults_used: BTreeSet<String>,
}

impl ResolvedParams {
    /// Wrap an already-validated mapping (no schema, no defaults)
    pub fn unchecked(object: &str, values: ParamMap) -> Self {
        Self {
            object: object.to_string(),
            values,
            defaults_used: BTreeSet::new(),
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value for `key`, which must be present
    pub fn require(&self, key: &str) -> ParamsResult<&Value> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigurationError::MissingParameter {
                object: self.object.clone(),
                key: key.to_string(),
            })
    }

    /// Keys filled from schema defaults
    pub fn defaults_used(&self) -> &BTreeSet<String> {
        &self.defaults_used
    }

    pub fn as_map(&self) -> &ParamMap {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_f64(&self, key: &str) -> ParamsResult<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "number"))
    }

    pub fn get_u64(&self, key: &str) -> ParamsResult<u64> {
        self.require(key)?
            .as_u64()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "unsigned integer"))
    }

    pub fn get_bool(&self, key: &str) -> ParamsResult<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "boolean"))
    }

    pub fn get_str(&self, key: &str) -> ParamsResult<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "string"))
    }

    /// String value, treating `null` as absent
    pub fn get_opt_str(&self, key: &str) -> ParamsResult<Option<&str>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ConfigurationError::wrong_type(&self.object, key, "string")),
        }
    }

    pub fn get_list(&self, key: &str) -> ParamsResult<&Vec<Value>> {
        self.require(key)?
            .as_array()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "list"))
    }

    pub fn get_str_list(&self, key: &str) -> ParamsResult<Vec<String>> {
        self.get_list(key)?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "list of strings"))
            })
            .collect()
    }

    pub fn get_map(&self, key: &str) -> ParamsResult<&serde_json::Map<String, Value>> {
        self.require(key)?
            .as_object()
            .ok_or_else(|| ConfigurationError::wrong_type(&self.object, key, "mapping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ParamMap {
        serde_json::from_value(value).unwrap()
    }

    fn r_o_schema() -> Schema {
        Schema::new().mandatory("r").optional("o", "d")
    }

    #[test]
    fn test_default_filled_and_recorded() {
        let resolved = r_o_schema().validate("obj", &map(json!({"r": 5}))).unwrap();
        assert_eq!(resolved.get("r"), Some(&json!(5)));
        assert_eq!(resolved.get("o"), Some(&json!("d")));
        assert!(resolved.defaults_used().contains("o"));
        assert!(!resolved.defaults_used().contains("r"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = r_o_schema()
            .validate("obj", &map(json!({"r": 5, "x": 1})))
            .unwrap_err();
        match err {
            ConfigurationError::UnrecognizedParameter { object, key } => {
                assert_eq!(object, "obj");
                assert_eq!(key, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_mandatory_named() {
        let err = r_o_schema().validate("obj", &ParamMap::new()).unwrap_err();
        assert!(
            matches!(err, ConfigurationError::MissingParameter { ref key, .. } if key == "r"),
            "got {err}"
        );
    }

    #[test]
    fn test_reserved_key_rejected_even_when_open() {
        let schema = Schema::open().reserved("elements");
        let err = schema
            .validate("layer l1", &map(json!({"rows": 2, "elements": []})))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ReservedParameter { .. }));
        assert!(schema.validate("layer l1", &map(json!({"rows": 2}))).is_ok());
    }

    #[test]
    fn test_typed_accessors() {
        let resolved = Schema::open()
            .validate(
                "obj",
                &map(json!({"n": 3, "f": 0.5, "b": true, "s": "x", "l": ["a", "b"], "z": null})),
            )
            .unwrap();
        assert_eq!(resolved.get_u64("n").unwrap(), 3);
        assert_eq!(resolved.get_f64("f").unwrap(), 0.5);
        assert!(resolved.get_bool("b").unwrap());
        assert_eq!(resolved.get_str("s").unwrap(), "x");
        assert_eq!(resolved.get_str_list("l").unwrap(), vec!["a", "b"]);
        assert_eq!(resolved.get_opt_str("z").unwrap(), None);
        assert!(matches!(
            resolved.get_u64("s"),
            Err(ConfigurationError::InvalidParameterType { .. })
        ));
    }
}
