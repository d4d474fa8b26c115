// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Artifacts: typed data items produced or consumed by tasks
//!
//! The [`ArtifactRegistry`] records, at build time, every artifact a pipeline can
//! produce together with its provenance. At run time the scheduler keeps the
//! materialized values in an [`ArtifactStore`], keyed by the same ids.

mod value;

pub use value::{ArtifactKind, ArtifactPayload, DataType, ParamValue, Value};

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Namespace of external parameter artifacts
pub const PARAMS_NAMESPACE: &str = "params";

/// Identifier of an artifact.
///
/// Task outputs are named `<node_id>.<output>`, external parameters `params.<name>`.
/// Ids stay unambiguous only while no name segment contains a `.` and no node
/// is called `params`; [`ArtifactId::check_node_id`] and
/// [`ArtifactId::check_segment`] enforce that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn output(node_id: &str, output: &str) -> Self {
        Self(format!("{}.{}", node_id, output))
    }

    pub fn param(name: &str) -> Self {
        Self(format!("{}.{}", PARAMS_NAMESPACE, name))
    }

    /// Reject a node id that would alias another artifact id
    pub fn check_node_id(id: &str) -> Result<(), String> {
        if id == PARAMS_NAMESPACE {
            return Err(format!("'{}' is reserved for external parameters", PARAMS_NAMESPACE));
        }
        Self::check_segment(id)
    }

    /// Reject an output or parameter name that would alias another artifact id
    pub fn check_segment(name: &str) -> Result<(), String> {
        if name.is_empty() {
            Err("names must not be empty".to_string())
        } else if name.contains('.') {
            Err(format!("'{}' must not contain '.'", name))
        } else {
            Ok(())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produces an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Producer {
    /// Output of the task node with this id
    Task(String),
    /// Supplied at submission time
    External,
}

/// A typed data item with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub data_type: DataType,
    pub producer: Producer,
    pub logical_name: String,
}

/// Build-time registry of every artifact in a pipeline
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: BTreeMap<ArtifactId, Artifact>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output of a task node
    pub fn register_output(&mut self, node_id: &str, output: &str, data_type: DataType) -> ArtifactId {
        let id = ArtifactId::output(node_id, output);
        self.artifacts.insert(
            id.clone(),
            Artifact {
                id: id.clone(),
                kind: data_type.kind(),
                data_type,
                producer: Producer::Task(node_id.to_string()),
                logical_name: output.to_string(),
            },
        );
        id
    }

    /// Register an externally supplied parameter.
    ///
    /// Returns `None` if a parameter with this name is already registered.
    pub fn register_external(&mut self, name: &str, data_type: DataType) -> Option<ArtifactId> {
        let id = ArtifactId::param(name);
        if self.artifacts.contains_key(&id) {
            return None;
        }
        self.artifacts.insert(
            id.clone(),
            Artifact {
                id: id.clone(),
                kind: data_type.kind(),
                data_type,
                producer: Producer::External,
                logical_name: name.to_string(),
            },
        );
        Some(id)
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// Look up the artifact for a node's output
    pub fn output(&self, node_id: &str, output: &str) -> Option<&Artifact> {
        self.get(&ArtifactId::output(node_id, output))
    }

    /// Look up the artifact for an external parameter
    pub fn param(&self, name: &str) -> Option<&Artifact> {
        self.get(&ArtifactId::param(name))
    }

    /// Artifacts produced by a node, in id order
    pub fn produced_by<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Artifact> + 'a {
        self.artifacts
            .values()
            .filter(move |a| matches!(&a.producer, Producer::Task(n) if n == node_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Materialized artifact values of one run
#[derive(Debug, Default)]
pub struct ArtifactStore {
    values: HashMap<ArtifactId, Value>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value. Artifacts are immutable: returns false and keeps the
    /// existing value if `id` is already present.
    pub fn insert(&mut self, id: ArtifactId, value: Value) -> bool {
        match self.values.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
