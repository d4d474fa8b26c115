// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Pipeline compiler
//!
//! Turns a sealed [`Pipeline`] into a [`Manifest`]. Compilation is pure and
//! deterministic: every collection in the output is ordered, so structurally
//! identical pipelines produce byte-identical manifests.

mod manifest;

pub use manifest::{
    Manifest, ManifestEdge, ManifestNode, NodeInput, NodeOutput, PipelineInfo, API_VERSION,
};

use std::collections::HashSet;
use tracing::debug;

use crate::artifact::ArtifactId;
use crate::errors::DagflowError;
use crate::pipeline::{derive_edges, Pipeline, TaskGraph, TaskNode};

/// Pipeline compiler
pub struct Compiler;

impl Compiler {
    /// Compile a sealed pipeline
    pub fn compile(pipeline: &Pipeline) -> Result<Manifest, DagflowError> {
        Self::check_consistency(pipeline)?;

        let mut parameters = pipeline.params.clone();
        parameters.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes: Vec<ManifestNode> = pipeline.nodes.iter().map(Self::compile_node).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let edges = pipeline
            .edges
            .iter()
            .map(|(from, to)| ManifestEdge {
                from: from.clone(),
                to: to.clone(),
            })
            .collect();

        let manifest = Manifest {
            api_version: API_VERSION.to_string(),
            pipeline: PipelineInfo {
                name: pipeline.name.clone(),
                description: pipeline.description.clone(),
            },
            parameters,
            nodes,
            edges,
        };
        debug!(pipeline = %pipeline.name, nodes = manifest.nodes.len(), "Compiled manifest");
        Ok(manifest)
    }

    fn compile_node(node: &TaskNode) -> ManifestNode {
        let mut inputs: Vec<NodeInput> = node
            .definition
            .inputs
            .iter()
            .map(|spec| NodeInput {
                name: spec.name.clone(),
                data_type: spec.data_type,
                binding: node.bindings.get(&spec.name).cloned(),
                default: spec.default.clone(),
            })
            .collect();
        inputs.sort_by(|a, b| a.name.cmp(&b.name));

        let outputs = node
            .definition
            .outputs
            .iter()
            .zip(&node.outputs)
            .map(|(spec, artifact)| NodeOutput {
                name: spec.name.clone(),
                data_type: spec.data_type,
                artifact: artifact.clone(),
            })
            .collect();

        ManifestNode {
            id: node.id.clone(),
            name: node.name.clone(),
            component: node.definition.name.clone(),
            inputs,
            outputs,
            resources: node.resources.clone(),
            condition: node.condition.clone(),
            body: node.definition.body.clone(),
        }
    }

    /// Re-check the invariants `seal` established
    fn check_consistency(pipeline: &Pipeline) -> Result<(), DagflowError> {
        let broken = |reason: String| DagflowError::PrecompiledState { reason };

        if pipeline.nodes.is_empty() {
            return Err(broken("pipeline has no nodes".into()));
        }

        let mut ids = HashSet::new();
        for node in &pipeline.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(broken(format!("duplicate node id '{}'", node.id)));
            }

            let expected: Vec<ArtifactId> = node
                .definition
                .outputs
                .iter()
                .map(|o| ArtifactId::output(&node.id, &o.name))
                .collect();
            if node.outputs != expected {
                return Err(broken(format!("outputs of node '{}' do not match its definition", node.id)));
            }
            for artifact in &node.outputs {
                if pipeline.registry.get(artifact).is_none() {
                    return Err(broken(format!("artifact '{}' is not registered", artifact)));
                }
            }

            for input in &node.definition.inputs {
                if input.default.is_none() && !node.bindings.contains_key(&input.name) {
                    return Err(broken(format!("input '{}.{}' is unbound", node.id, input.name)));
                }
            }
            for dep in node.dependencies() {
                if !ids.contains(dep) && pipeline.node(dep).is_none() {
                    return Err(broken(format!("node '{}' depends on unknown node '{}'", node.id, dep)));
                }
            }
        }

        if derive_edges(&pipeline.nodes) != pipeline.edges {
            return Err(broken("edge list does not match node bindings".into()));
        }

        let graph = TaskGraph::from_edges(
            pipeline.nodes.iter().map(|n| n.id.as_str()),
            pipeline.edges.iter().map(|(a, b)| (a.as_str(), b.as_str())),
        );
        graph.validate_acyclic().map_err(|e| broken(e.to_string()))
    }
}

/// Compile a sealed pipeline into a manifest
pub fn compile(pipeline: &Pipeline) -> Result<Manifest, DagflowError> {
    Compiler::compile(pipeline)
}
