// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Typed values that flow between tasks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Dataset,
    Model,
    Metrics,
    /// A scalar parameter value
    Value,
}

/// Declared type of a task input, task output or pipeline parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Dataset,
    Model,
    Metrics,
    String,
    Float,
    Int,
    Bool,
}

impl DataType {
    /// Artifact kind carrying values of this type
    pub fn kind(self) -> ArtifactKind {
        match self {
            DataType::Dataset => ArtifactKind::Dataset,
            DataType::Model => ArtifactKind::Model,
            DataType::Metrics => ArtifactKind::Metrics,
            DataType::String | DataType::Float | DataType::Int | DataType::Bool => {
                ArtifactKind::Value
            }
        }
    }

    /// Whether values of this type are stored by reference (URI)
    pub fn is_artifact(self) -> bool {
        self.kind() != ArtifactKind::Value
    }

    /// Whether a value declared as `actual` can be bound where `self` is expected.
    ///
    /// Types must match exactly, except that `int` widens to `float`.
    pub fn accepts(self, actual: DataType) -> bool {
        self == actual || (self == DataType::Float && actual == DataType::Int)
    }

    /// Check a runtime value against this type, applying the allowed coercions.
    ///
    /// Artifact types accept a payload, or a plain string which is taken as the
    /// payload URI. On mismatch the error names the value's actual type.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (t, Value::Artifact(payload)) if t.is_artifact() => Ok(Value::Artifact(payload)),
            (t, Value::Param(ParamValue::String(uri))) if t.is_artifact() => {
                Ok(Value::Artifact(ArtifactPayload::new(uri)))
            }
            (t, Value::Param(p)) if !t.is_artifact() => t.coerce_param(p).map(Value::Param),
            (_, other) => Err(other.type_name()),
        }
    }

    /// Check a scalar against this type
    pub fn coerce_param(self, value: ParamValue) -> Result<ParamValue, String> {
        match (self, value) {
            (DataType::Float, ParamValue::Int(i)) => Ok(ParamValue::Float(i as f64)),
            (t, v) if t == v.data_type() => Ok(v),
            (t, ParamValue::String(s)) if t.is_artifact() => Ok(ParamValue::String(s)),
            (_, v) => Err(v.data_type().to_string()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Dataset => "dataset",
            DataType::Model => "model",
            DataType::Metrics => "metrics",
            DataType::String => "string",
            DataType::Float => "float",
            DataType::Int => "int",
            DataType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A scalar parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ParamValue::Bool(_) => DataType::Bool,
            ParamValue::Int(_) => DataType::Int,
            ParamValue::Float(_) => DataType::Float,
            ParamValue::String(_) => DataType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality with int/float treated as one numeric domain
    pub fn loosely_equals(&self, other: &ParamValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Parse a command-line value: YAML scalar rules, falling back to a plain string.
    pub fn parse_lenient(text: &str) -> Self {
        match serde_yaml::from_str::<ParamValue>(text) {
            Ok(value) => value,
            Err(_) => ParamValue::String(text.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

/// Location and small metadata of a materialized artifact.
///
/// The orchestrator never copies artifact bytes; it only passes URIs around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub uri: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ArtifactPayload {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A runtime value: either a scalar or an artifact reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Param(ParamValue),
    Artifact(ArtifactPayload),
}

impl Value {
    /// Shorthand for an artifact value
    pub fn artifact(uri: impl Into<String>) -> Self {
        Value::Artifact(ArtifactPayload::new(uri))
    }

    pub fn as_param(&self) -> Option<&ParamValue> {
        match self {
            Value::Param(p) => Some(p),
            Value::Artifact(_) => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&ArtifactPayload> {
        match self {
            Value::Artifact(a) => Some(a),
            Value::Param(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Param(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_param().and_then(ParamValue::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Param(ParamValue::String(s)) => Some(s),
            Value::Artifact(a) => Some(&a.uri),
            _ => None,
        }
    }

    /// Name of the value's runtime type, used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Param(p) => p.data_type().to_string(),
            Value::Artifact(_) => "artifact".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Param(p) => write!(f, "{}", p),
            Value::Artifact(a) => write!(f, "{}", a.uri),
        }
    }
}

impl From<ParamValue> for Value {
    fn from(v: ParamValue) -> Self {
        Value::Param(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Param(ParamValue::from(v))
    }
}

impl From<ArtifactPayload> for Value {
    fn from(v: ArtifactPayload) -> Self {
        Value::Artifact(v)
    }
}
