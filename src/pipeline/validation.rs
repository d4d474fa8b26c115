// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Pipeline validation
//!
//! Checks a pipeline under construction. Problems are collected in phase
//! order (dangling references, cycles, types, unbound inputs), so the first
//! error is the one `seal` reports.

use std::collections::{BTreeSet, HashSet};

use super::builder::{Binding, PipelineBuilder, TaskNode};
use super::condition::GateRef;
use super::dag::TaskGraph;
use crate::artifact::DataType;
use crate::errors::DagflowError;

/// Pipeline validator
pub struct PipelineValidator;

/// Every problem found in a builder, in reporting order
#[derive(Debug, Default)]
pub(crate) struct Diagnosis {
    pub errors: Vec<DagflowError>,
    pub warnings: Vec<String>,
}

impl PipelineValidator {
    /// Validate a pipeline and render the diagnostics as messages
    pub fn validate(builder: &PipelineBuilder) -> ValidationResult {
        let diagnosis = Self::diagnose(builder);
        let mut result = ValidationResult::new();
        for error in &diagnosis.errors {
            result.add_error(&error.to_string());
        }
        for warning in &diagnosis.warnings {
            result.add_warning(warning);
        }
        result
    }

    pub(crate) fn diagnose(builder: &PipelineBuilder) -> Diagnosis {
        let mut diagnosis = Diagnosis {
            errors: builder.deferred.clone(),
            warnings: Vec::new(),
        };

        if builder.nodes.is_empty() {
            diagnosis.errors.push(DagflowError::EmptyPipeline {
                pipeline: builder.name.clone(),
            });
            return diagnosis;
        }

        // Dangling references
        for node in &builder.nodes {
            Self::check_references(builder, node, &mut diagnosis.errors);
        }

        // Cycles
        let graph = TaskGraph::from_edges(
            builder.nodes.iter().map(|n| n.id.as_str()),
            builder
                .nodes
                .iter()
                .flat_map(|n| n.dependencies().into_iter().map(move |dep| (dep, n.id.as_str()))),
        );
        if let Err(e) = graph.validate_acyclic() {
            diagnosis.errors.push(e);
        }

        // Types
        for node in &builder.nodes {
            Self::check_types(builder, node, &mut diagnosis.errors);
        }

        // Completeness
        for node in &builder.nodes {
            for input in &node.definition.inputs {
                if input.default.is_none() && !node.bindings.contains_key(&input.name) {
                    diagnosis.errors.push(DagflowError::UnboundInput {
                        node: node.id.clone(),
                        input: input.name.clone(),
                    });
                }
            }
        }

        Self::collect_warnings(builder, &mut diagnosis.warnings);
        diagnosis
    }

    /// Report bindings and gates that point at nothing
    fn check_references(builder: &PipelineBuilder, node: &TaskNode, errors: &mut Vec<DagflowError>) {
        for (input, binding) in &node.bindings {
            if node.definition.get_input(input).is_none() {
                errors.push(DagflowError::UnknownInput {
                    node: node.id.clone(),
                    input: input.clone(),
                    component: node.definition.name.clone(),
                });
            }
            match binding {
                Binding::Param { param } if builder.registry.param(param).is_none() => {
                    errors.push(DagflowError::UnknownParameter {
                        node: node.id.clone(),
                        parameter: param.clone(),
                    });
                }
                Binding::Output { task, output } => {
                    if let Some(e) = Self::check_output_ref(builder, node, input, task, output) {
                        errors.push(e);
                    }
                }
                _ => {}
            }
        }

        for clause in &node.condition.all {
            match &clause.gate {
                GateRef::Param { param } if builder.registry.param(param).is_none() => {
                    errors.push(DagflowError::UnknownParameter {
                        node: node.id.clone(),
                        parameter: param.clone(),
                    });
                }
                GateRef::Output { task, output } => {
                    if let Some(e) = Self::check_output_ref(builder, node, "condition", task, output) {
                        errors.push(e);
                    }
                }
                _ => {}
            }
        }
    }

    fn check_output_ref(
        builder: &PipelineBuilder,
        node: &TaskNode,
        input: &str,
        task: &str,
        output: &str,
    ) -> Option<DagflowError> {
        if builder.node(task).is_none() {
            return Some(DagflowError::UnknownTask {
                node: node.id.clone(),
                task: task.to_string(),
            });
        }
        if builder.registry.output(task, output).is_none() {
            return Some(DagflowError::UnknownOutput {
                node: node.id.clone(),
                input: input.to_string(),
                task: task.to_string(),
                output: output.to_string(),
            });
        }
        None
    }

    /// Declared type of whatever a binding points at, if it resolves
    fn binding_type(builder: &PipelineBuilder, binding: &Binding) -> Option<DataType> {
        match binding {
            Binding::Param { param } => builder.registry.param(param).map(|a| a.data_type),
            Binding::Output { task, output } => builder.registry.output(task, output).map(|a| a.data_type),
            Binding::Literal(value) => Some(value.data_type()),
        }
    }

    fn check_types(builder: &PipelineBuilder, node: &TaskNode, errors: &mut Vec<DagflowError>) {
        for (name, binding) in &node.bindings {
            let Some(input) = node.definition.get_input(name) else {
                continue;
            };
            let Some(actual) = Self::binding_type(builder, binding) else {
                continue;
            };
            if !input.data_type.accepts(actual) {
                errors.push(DagflowError::TypeMismatch {
                    node: node.id.clone(),
                    input: name.clone(),
                    expected: input.data_type,
                    actual,
                });
            }
        }

        for clause in &node.condition.all {
            let gate_type = match &clause.gate {
                GateRef::Param { param } => builder.registry.param(param).map(|a| a.data_type),
                GateRef::Output { task, output } => builder.registry.output(task, output).map(|a| a.data_type),
            };
            let Some(gate_type) = gate_type else {
                continue;
            };
            let expected_type = clause.equals.data_type();
            if gate_type.is_artifact() || !gate_type.accepts(expected_type) {
                errors.push(DagflowError::TypeMismatch {
                    node: node.id.clone(),
                    input: "condition".to_string(),
                    expected: gate_type,
                    actual: expected_type,
                });
            }
        }
    }

    fn collect_warnings(builder: &PipelineBuilder, warnings: &mut Vec<String>) {
        let mut used: HashSet<&str> = HashSet::new();
        for node in &builder.nodes {
            for binding in node.bindings.values() {
                if let Binding::Param { param } = binding {
                    used.insert(param);
                }
            }
            for clause in &node.condition.all {
                if let GateRef::Param { param } = &clause.gate {
                    used.insert(param);
                }
            }
        }
        for param in &builder.params {
            if !used.contains(param.name.as_str()) {
                warnings.push(format!("Parameter '{}' is never used", param.name));
            }
        }

        for node in &builder.nodes {
            for warning in node.resources.warnings() {
                warnings.push(format!("Task '{}': {}", node.id, warning));
            }
        }

        let components: BTreeSet<&str> = builder.nodes.iter().map(|n| n.definition.name.as_str()).collect();
        for component in components {
            let bodies: BTreeSet<String> = builder
                .nodes
                .iter()
                .filter(|n| n.definition.name == component)
                .map(|n| n.definition.body.describe())
                .collect();
            if bodies.len() > 1 {
                warnings.push(format!(
                    "Component '{}' is used with {} different bodies",
                    component,
                    bodies.len()
                ));
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ParamValue;
    use crate::pipeline::definition::{BodyRef, TaskDefinition};
    use crate::pipeline::resources::ResourceProfile;

    fn consumer() -> TaskDefinition {
        TaskDefinition::new("consumer", BodyRef::registered("c"))
            .input("data", DataType::Dataset)
            .input("ratio", DataType::Float)
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let builder = PipelineBuilder::new("empty");
        let result = builder.validate();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no tasks"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut builder = PipelineBuilder::new("p");
        builder
            .task("c", &consumer())
            .bind("ratio", Binding::Param {
                param: "missing".into(),
            })
            .value("extra", true)
            .add();

        let result = builder.validate();
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
        assert!(result.errors.iter().any(|e| e.contains("unknown parameter 'missing'")));
        assert!(result.errors.iter().any(|e| e.contains("'extra'")));
        assert!(result.errors.iter().any(|e| e.contains("input 'data' is not bound")));
    }

    #[test]
    fn test_dangling_reported_before_unbound() {
        let mut builder = PipelineBuilder::new("p");
        builder
            .task("c", &consumer())
            .bind("ratio", Binding::Output {
                task: "ghost".into(),
                output: "x".into(),
            })
            .add();
        assert!(matches!(
            builder.seal(),
            Err(DagflowError::UnknownTask { task, .. }) if task == "ghost"
        ));
    }

    #[test]
    fn test_condition_type_mismatch() {
        let check = TaskDefinition::new("check", BodyRef::registered("check")).output("passed", DataType::Bool);
        let sink = TaskDefinition::new("sink", BodyRef::registered("sink"));
        let mut builder = PipelineBuilder::new("p");
        let c = builder.define_task("check", &check, []);
        {
            let mut scope = builder.begin_condition(c.output("passed"), "yes");
            scope.define_task("sink", &sink, []);
        }
        match builder.seal() {
            Err(DagflowError::TypeMismatch { node, input, expected, actual }) => {
                assert_eq!(node, "sink");
                assert_eq!(input, "condition");
                assert_eq!(expected, DataType::Bool);
                assert_eq!(actual, DataType::String);
            }
            other => panic!("expected condition mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_warnings() {
        let def = TaskDefinition::new("t", BodyRef::registered("t"))
            .resources(ResourceProfile::parse("2", "1", "1Gi", "2Gi").unwrap());
        let mut builder = PipelineBuilder::new("p");
        builder.param("unused", DataType::String, Some(ParamValue::from("x")));
        builder.define_task("t", &def, []);

        let result = builder.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("'unused' is never used")));
        assert!(result.warnings.iter().any(|w| w.contains("cpu request 2 exceeds limit 1")));
    }

    #[test]
    fn test_duplicate_parameter() {
        let mut builder = PipelineBuilder::new("p");
        builder.param("x", DataType::Int, None);
        builder.param("x", DataType::Int, None);
        builder.define_task("t", &TaskDefinition::new("t", BodyRef::registered("t")), []);
        assert!(matches!(builder.seal(), Err(DagflowError::DuplicateParameter { .. })));
    }
}
