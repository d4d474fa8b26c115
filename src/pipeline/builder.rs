// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Pipeline builder
//!
//! Assembles task nodes from [`TaskDefinition`]s and bindings, then seals the
//! result into an immutable [`Pipeline`]. Building performs no I/O; every
//! structural problem is reported by [`PipelineBuilder::seal`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::condition::{Condition, ConditionClause, ConditionScope, GateRef};
use super::definition::{ParameterSpec, TaskDefinition};
use super::resources::ResourceProfile;
use super::validation::{PipelineValidator, ValidationResult};
use crate::artifact::{ArtifactId, ArtifactRegistry, DataType, ParamValue};
use crate::errors::DagflowError;

/// Reference to an external parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef(pub(crate) String);

impl ParamRef {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Reference to an output of a task node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: String,
    pub output: String,
}

/// Reference to an input of a task node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: String,
    pub input: String,
}

/// Where a task input takes its value from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    /// An external parameter
    Param { param: String },
    /// An output of another task
    Output { task: String, output: String },
    /// A constant
    Literal(ParamValue),
}

impl Binding {
    /// Node this binding depends on, if any
    pub fn producer(&self) -> Option<&str> {
        match self {
            Binding::Output { task, .. } => Some(task),
            _ => None,
        }
    }
}

impl From<OutputRef> for Binding {
    fn from(r: OutputRef) -> Self {
        Binding::Output {
            task: r.node,
            output: r.output,
        }
    }
}

impl From<ParamRef> for Binding {
    fn from(r: ParamRef) -> Self {
        Binding::Param { param: r.0 }
    }
}

impl From<&ParamRef> for Binding {
    fn from(r: &ParamRef) -> Self {
        Binding::Param { param: r.0.clone() }
    }
}

impl From<ParamValue> for Binding {
    fn from(v: ParamValue) -> Self {
        Binding::Literal(v)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Param { param } => write!(f, "params.{}", param),
            Binding::Output { task, output } => write!(f, "{}.{}", task, output),
            Binding::Literal(v) => write!(f, "{}", v),
        }
    }
}

/// Handle to a defined task node
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: String,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reference to one of the node's outputs
    pub fn output(&self, name: &str) -> OutputRef {
        OutputRef {
            node: self.id.clone(),
            output: name.to_string(),
        }
    }

    /// Reference to one of the node's inputs, for [`PipelineBuilder::connect`]
    pub fn input(&self, name: &str) -> InputRef {
        InputRef {
            node: self.id.clone(),
            input: name.to_string(),
        }
    }
}

/// A task instantiated in a pipeline
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) definition: TaskDefinition,
    pub(crate) bindings: BTreeMap<String, Binding>,
    pub(crate) outputs: Vec<ArtifactId>,
    pub(crate) resources: ResourceProfile,
    pub(crate) condition: Condition,
}

impl TaskNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn bindings(&self) -> &BTreeMap<String, Binding> {
        &self.bindings
    }

    /// Artifacts this node produces, in output declaration order
    pub fn outputs(&self) -> &[ArtifactId] {
        &self.outputs
    }

    pub fn resources(&self) -> &ResourceProfile {
        &self.resources
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Nodes this node reads from, through bindings or its condition
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.bindings
            .values()
            .filter_map(Binding::producer)
            .chain(self.condition.producers())
            .collect()
    }
}

/// A sealed, validated pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) params: Vec<ParameterSpec>,
    pub(crate) nodes: Vec<TaskNode>,
    pub(crate) edges: Vec<(String, String)>,
    pub(crate) registry: ArtifactRegistry,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    /// Nodes in build order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// `(producer, consumer)` pairs, sorted
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }
}

/// Mutable pipeline under construction
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) params: Vec<ParameterSpec>,
    pub(crate) nodes: Vec<TaskNode>,
    pub(crate) registry: ArtifactRegistry,
    pub(crate) scopes: Vec<ConditionClause>,
    /// Problems found while building, reported at seal time
    pub(crate) deferred: Vec<DagflowError>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an external parameter
    pub fn param(&mut self, name: &str, data_type: DataType, default: Option<ParamValue>) -> ParamRef {
        if let Err(reason) = ArtifactId::check_segment(name) {
            self.reject_name("parameter", name, reason);
        }
        if self.registry.register_external(name, data_type).is_none() {
            self.deferred.push(DagflowError::DuplicateParameter {
                parameter: name.to_string(),
            });
        } else {
            self.params.push(ParameterSpec {
                name: name.to_string(),
                data_type,
                default,
            });
        }
        ParamRef(name.to_string())
    }

    /// Instantiate a task definition as a new node
    pub fn define_task<'b>(
        &mut self,
        name: &str,
        definition: &TaskDefinition,
        bindings: impl IntoIterator<Item = (&'b str, Binding)>,
    ) -> TaskHandle {
        self.define_task_with_resources(name, definition, bindings, &ResourceProfile::default())
    }

    /// Instantiate a task definition with resources overriding the definition's defaults
    pub fn define_task_with_resources<'b>(
        &mut self,
        name: &str,
        definition: &TaskDefinition,
        bindings: impl IntoIterator<Item = (&'b str, Binding)>,
        resources: &ResourceProfile,
    ) -> TaskHandle {
        let id = self.next_id(name);
        if let Err(reason) = ArtifactId::check_node_id(&id) {
            self.reject_name("task", &id, reason);
        }
        for output in &definition.outputs {
            if let Err(reason) = ArtifactId::check_segment(&output.name) {
                self.reject_name(&format!("output of task '{}'", id), &output.name, reason);
            }
        }
        let outputs = definition
            .outputs
            .iter()
            .map(|o| self.registry.register_output(&id, &o.name, o.data_type))
            .collect();

        let node = TaskNode {
            id: id.clone(),
            name: name.to_string(),
            definition: definition.clone(),
            bindings: bindings
                .into_iter()
                .map(|(input, binding)| (input.to_string(), binding))
                .collect(),
            outputs,
            resources: definition.resources.merged_with(resources),
            condition: Condition {
                all: self.scopes.clone(),
            },
        };
        debug!(node = %id, component = %definition.name, "Defined task");
        self.nodes.push(node);

        TaskHandle { id }
    }

    /// Start a fluent task definition
    pub fn task<'s>(&'s mut self, name: &str, definition: &TaskDefinition) -> TaskBuilder<'s> {
        TaskBuilder {
            builder: self,
            name: name.to_string(),
            definition: definition.clone(),
            bindings: Vec::new(),
            resources: ResourceProfile::default(),
        }
    }

    /// Bind a producer's output to a consumer's input, replacing any existing binding
    pub fn connect(&mut self, producer: OutputRef, consumer: InputRef) {
        match self.nodes.iter_mut().find(|n| n.id == consumer.node) {
            Some(node) => {
                node.bindings.insert(consumer.input, producer.into());
            }
            None => self.deferred.push(DagflowError::InvalidPipeline {
                reason: format!("cannot connect to unknown task '{}'", consumer.node),
                help: None,
            }),
        }
    }

    /// Open a conditional scope: tasks defined through the returned guard run only
    /// when `gate` equals `expected` at run time
    pub fn begin_condition(
        &mut self,
        gate: impl Into<GateRef>,
        expected: impl Into<ParamValue>,
    ) -> ConditionScope<'_> {
        let clause = ConditionClause {
            gate: gate.into(),
            equals: expected.into(),
        };
        ConditionScope::open(self, clause)
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    /// Collect every diagnostic without sealing
    pub fn validate(&self) -> ValidationResult {
        PipelineValidator::validate(self)
    }

    /// Check the pipeline and freeze it.
    ///
    /// Fails on the first problem found, checking dangling references, then
    /// cycles, then types, then unbound inputs.
    pub fn seal(self) -> Result<Pipeline, DagflowError> {
        let diagnosis = PipelineValidator::diagnose(&self);
        for warning in &diagnosis.warnings {
            warn!(pipeline = %self.name, "{}", warning);
        }
        if let Some(error) = diagnosis.errors.into_iter().next() {
            return Err(error);
        }

        let edges = derive_edges(&self.nodes);
        debug!(
            pipeline = %self.name,
            nodes = self.nodes.len(),
            edges = edges.len(),
            "Sealed pipeline"
        );

        Ok(Pipeline {
            name: self.name,
            description: self.description,
            params: self.params,
            nodes: self.nodes,
            edges,
            registry: self.registry,
        })
    }

    fn reject_name(&mut self, what: &str, name: &str, reason: String) {
        self.deferred.push(DagflowError::InvalidPipeline {
            reason: format!("invalid {} name '{}': {}", what, name, reason),
            help: Some("Rename it; artifact ids are built as <task>.<output> and params.<name>".to_string()),
        });
    }

    fn next_id(&self, name: &str) -> String {
        let taken = |id: &str| self.nodes.iter().any(|n| n.id == id);
        if !taken(name) {
            return name.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", name, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

/// Sorted, deduplicated `(producer, consumer)` edges between existing nodes
pub(crate) fn derive_edges(nodes: &[TaskNode]) -> Vec<(String, String)> {
    let ids: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut edges = BTreeSet::new();
    for node in nodes {
        for dep in node.dependencies() {
            if ids.contains(dep) {
                edges.insert((dep.to_string(), node.id.clone()));
            }
        }
    }
    edges.into_iter().collect()
}

/// Fluent alternative to [`PipelineBuilder::define_task`]
pub struct TaskBuilder<'s> {
    builder: &'s mut PipelineBuilder,
    name: String,
    definition: TaskDefinition,
    bindings: Vec<(String, Binding)>,
    resources: ResourceProfile,
}

impl TaskBuilder<'_> {
    pub fn bind(mut self, input: &str, binding: impl Into<Binding>) -> Self {
        self.bindings.push((input.to_string(), binding.into()));
        self
    }

    /// Bind an input to a constant
    pub fn value(self, input: &str, value: impl Into<ParamValue>) -> Self {
        self.bind(input, Binding::Literal(value.into()))
    }

    pub fn resources(mut self, profile: ResourceProfile) -> Self {
        self.resources = profile;
        self
    }

    pub fn add(self) -> TaskHandle {
        let bindings: Vec<(&str, Binding)> = self
            .bindings
            .iter()
            .map(|(input, binding)| (input.as_str(), binding.clone()))
            .collect();
        self.builder
            .define_task_with_resources(&self.name, &self.definition, bindings, &self.resources)
    }
}
