//! Critical-metadata value type
//!
//! Loosely-typed metadata blobs become a schema-validated tagged union at the
//! boundary. Canonicalization and recovery both depend on the exact shape, so
//! malformed input (non-object roots, empty keys, non-finite numbers) is
//! rejected explicitly instead of being passed through.
//!
//! `CriticalMetadata` keeps fields in a `BTreeMap`, which makes key ordering
//! deterministic at every nesting level regardless of insertion order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{AnchorageError, Result};

/// A single metadata field value.
///
/// Untagged: serializes as plain JSON. Integers are kept distinct from floats
/// so that canonical bytes are stable across round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Convert from an arbitrary JSON value, validating shape.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(FieldValue::Null),
            serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    if !f.is_finite() {
                        return Err(AnchorageError::InvalidMetadata(
                            "non-finite number in metadata".into(),
                        ));
                    }
                    Ok(FieldValue::Float(f))
                } else {
                    Err(AnchorageError::InvalidMetadata(format!(
                        "unrepresentable number: {}",
                        n
                    )))
                }
            }
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let list = items
                    .iter()
                    .map(FieldValue::from_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(FieldValue::List(list))
            }
            serde_json::Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (key, val) in map {
                    if key.is_empty() {
                        return Err(AnchorageError::InvalidMetadata(
                            "empty field name in metadata".into(),
                        ));
                    }
                    out.insert(key.clone(), FieldValue::from_json(val)?);
                }
                Ok(FieldValue::Map(out))
            }
        }
    }

    /// Convert back to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::List(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// The authoritative, fingerprinted subset of an asset's metadata.
///
/// Two instances with the same key/value pairs are equal regardless of how
/// they were built, which is what makes content addressing work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriticalMetadata(pub BTreeMap<String, FieldValue>);

impl CriticalMetadata {
    /// Validate and convert an arbitrary JSON value. The root must be a
    /// non-empty object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match FieldValue::from_json(value)? {
            FieldValue::Map(map) => {
                if map.is_empty() {
                    return Err(AnchorageError::InvalidMetadata(
                        "critical metadata must not be empty".into(),
                    ));
                }
                Ok(CriticalMetadata(map))
            }
            _ => Err(AnchorageError::InvalidMetadata(
                "critical metadata must be a JSON object".into(),
            )),
        }
    }

    /// Convert to a plain JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        FieldValue::Map(self.0.clone()).to_json()
    }

    /// Top-level field names.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    /// Field names whose value differs from `other` (added, removed, or
    /// changed). Used to report which fields a recovery restored.
    pub fn diff_fields(&self, other: &CriticalMetadata) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for (key, val) in &self.0 {
            match other.0.get(key) {
                Some(other_val) if other_val == val => {}
                _ => {
                    out.insert(key.clone());
                }
            }
        }
        for key in other.0.keys() {
            if !self.0.contains_key(key) {
                out.insert(key.clone());
            }
        }
        out
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
