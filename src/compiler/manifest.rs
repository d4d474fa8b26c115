// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Compiled manifest format
//!
//! A manifest is the serialized, self-contained form of a sealed pipeline. It
//! is the unit that is stored, exchanged and executed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::artifact::{ArtifactId, DataType, ParamValue};
use crate::cache::ContentHasher;
use crate::errors::DagflowError;
use crate::pipeline::{Binding, BodyRef, Condition, GateRef, ParameterSpec, ResourceProfile, TaskGraph};

/// Manifest format version
pub const API_VERSION: &str = "dagflow/v1";

/// Pipeline metadata carried in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input of a compiled node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// Output of a compiled node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub artifact: ArtifactId,
}

/// A compiled task node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub id: String,
    pub name: String,
    pub component: String,
    /// Inputs sorted by name
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    /// Outputs in declaration order
    #[serde(default)]
    pub outputs: Vec<NodeOutput>,
    #[serde(default, skip_serializing_if = "ResourceProfile::is_empty")]
    pub resources: ResourceProfile,
    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub condition: Condition,
    pub body: BodyRef,
}

impl ManifestNode {
    pub fn output(&self, name: &str) -> Option<&NodeOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn is_gated(&self) -> bool {
        !self.condition.is_empty()
    }
}

/// Explicit dependency edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEdge {
    pub from: String,
    pub to: String,
}

/// Compiled pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub api_version: String,
    pub pipeline: PipelineInfo,
    /// External parameters sorted by name
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Nodes sorted by id
    pub nodes: Vec<ManifestNode>,
    /// Edges sorted by `(from, to)`
    #[serde(default)]
    pub edges: Vec<ManifestEdge>,
}

impl Manifest {
    pub fn name(&self) -> &str {
        &self.pipeline.name
    }

    pub fn node(&self, id: &str) -> Option<&ManifestNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Content digest, used as the manifest reference
    pub fn digest(&self) -> Result<String, DagflowError> {
        ContentHasher::hash_manifest(self)
    }

    /// Dependency graph of the nodes
    pub fn graph(&self) -> TaskGraph {
        TaskGraph::from_edges(
            self.nodes.iter().map(|n| n.id.as_str()),
            self.edges.iter().map(|e| (e.from.as_str(), e.to.as_str())),
        )
    }

    pub fn to_json(&self) -> Result<String, DagflowError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn to_yaml(&self) -> Result<String, DagflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self, DagflowError> {
        serde_json::from_str(json).map_err(Into::into)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, DagflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Load a manifest, choosing the format from the file extension, and validate it
    pub fn from_file(path: &Path) -> Result<Self, DagflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| DagflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let manifest = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => Self::from_json(&content)?,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write as JSON, or YAML for `.yaml`/`.yml` paths
    pub fn write_to(&self, path: &Path) -> Result<(), DagflowError> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml()?,
            _ => self.to_json()?,
        };
        std::fs::write(path, content).map_err(|e| DagflowError::FileWriteError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Re-check a manifest that did not come straight from the compiler
    pub fn validate(&self) -> Result<(), DagflowError> {
        let invalid = |reason: String| DagflowError::InvalidManifest { reason };

        if self.api_version != API_VERSION {
            return Err(invalid(format!(
                "unsupported api_version '{}' (expected '{}')",
                self.api_version, API_VERSION
            )));
        }
        if self.nodes.is_empty() {
            return Err(invalid("manifest has no nodes".into()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(invalid(format!("duplicate node id '{}'", node.id)));
            }
            ArtifactId::check_node_id(&node.id).map_err(|r| invalid(format!("node '{}': {}", node.id, r)))?;
            for output in &node.outputs {
                ArtifactId::check_segment(&output.name)
                    .map_err(|r| invalid(format!("node '{}' output: {}", node.id, r)))?;
            }
        }
        for param in &self.parameters {
            ArtifactId::check_segment(&param.name).map_err(|r| invalid(format!("parameter: {}", r)))?;
        }

        let edges: HashSet<(&str, &str)> = self
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        for (from, to) in &edges {
            if !ids.contains(from) || !ids.contains(to) {
                return Err(invalid(format!("edge {} -> {} has an unknown endpoint", from, to)));
            }
        }

        for node in &self.nodes {
            for input in &node.inputs {
                match &input.binding {
                    Some(Binding::Param { param }) if self.parameter(param).is_none() => {
                        return Err(invalid(format!(
                            "node '{}' input '{}' binds undeclared parameter '{}'",
                            node.id, input.name, param
                        )));
                    }
                    Some(Binding::Output { task, output }) => {
                        self.check_output(node, task, output, &edges)?;
                    }
                    None if input.default.is_none() => {
                        return Err(invalid(format!(
                            "node '{}' input '{}' has neither binding nor default",
                            node.id, input.name
                        )));
                    }
                    _ => {}
                }
            }
            for clause in &node.condition.all {
                match &clause.gate {
                    GateRef::Param { param } if self.parameter(param).is_none() => {
                        return Err(invalid(format!(
                            "node '{}' condition reads undeclared parameter '{}'",
                            node.id, param
                        )));
                    }
                    GateRef::Output { task, output } => self.check_output(node, task, output, &edges)?,
                    _ => {}
                }
            }
        }

        self.graph()
            .validate_acyclic()
            .map_err(|e| invalid(e.to_string()))
    }

    fn check_output(
        &self,
        node: &ManifestNode,
        task: &str,
        output: &str,
        edges: &HashSet<(&str, &str)>,
    ) -> Result<(), DagflowError> {
        let producer = self.node(task).ok_or_else(|| DagflowError::InvalidManifest {
            reason: format!("node '{}' reads from unknown node '{}'", node.id, task),
        })?;
        if producer.output(output).is_none() {
            return Err(DagflowError::InvalidManifest {
                reason: format!("node '{}' reads unknown output '{}.{}'", node.id, task, output),
            });
        }
        if !edges.contains(&(task, node.id.as_str())) {
            return Err(DagflowError::InvalidManifest {
                reason: format!("missing edge {} -> {}", task, node.id),
            });
        }
        Ok(())
    }

    fn label(&self, id: &str) -> String {
        match self.node(id) {
            Some(node) if node.is_gated() => format!("{} ({}) if {}", id, node.component, node.condition),
            Some(node) => format!("{} ({})", id, node.component),
            None => id.to_string(),
        }
    }

    /// Execution plan as numbered text
    pub fn render_text(&self) -> Result<String, DagflowError> {
        self.graph().to_text(|id| self.label(id))
    }

    pub fn render_dot(&self) -> String {
        self.graph().to_dot(|id| self.label(id).replace('"', "\\\""))
    }

    pub fn render_mermaid(&self) -> String {
        self.graph().to_mermaid(|id| self.label(id).replace('"', "#quot;"))
    }
}
