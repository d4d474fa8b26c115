// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Pipeline files
//!
//! Defines the YAML schema for `pipeline.yaml` files and loads them into a
//! [`PipelineBuilder`]. Tasks may only reference tasks listed before them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use super::builder::{Binding, Pipeline, PipelineBuilder};
use super::condition::{ConditionClause, GateRef};
use super::definition::{ParameterSpec, TaskDefinition};
use super::resources::ResourceProfile;
use crate::errors::DagflowError;

/// Pipeline definition from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    /// File format version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// External parameters
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    /// Reusable task definitions
    #[serde(default)]
    pub components: Vec<TaskDefinition>,

    /// Task instances and conditional blocks, in build order
    pub tasks: Vec<TaskEntry>,
}

fn default_version() -> String {
    "1".to_string()
}

/// Entry of the `tasks:` list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskEntry {
    /// Tasks gated on a condition
    Condition(ConditionBlock),
    /// A single task
    Task(TaskSpec),
}

/// `when:` block wrapping gated tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionBlock {
    pub when: ConditionClause,
    pub tasks: Vec<TaskEntry>,
}

/// A task instance of a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name (unique within the file)
    pub name: String,

    /// Component to instantiate
    pub component: String,

    /// Input bindings: `{param: x}`, `{task: t, output: o}` or a literal
    #[serde(default)]
    pub inputs: BTreeMap<String, Binding>,

    /// Overrides for the component's resources
    #[serde(default, skip_serializing_if = "ResourceProfile::is_empty")]
    pub resources: ResourceProfile,
}

impl PipelineFile {
    /// Load pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, DagflowError> {
        if !path.exists() {
            return Err(DagflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| DagflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DagflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> Result<String, DagflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a component by name
    pub fn component(&self, name: &str) -> Option<&TaskDefinition> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Populate a builder with this file's parameters and tasks
    pub fn to_builder(&self) -> Result<PipelineBuilder, DagflowError> {
        let mut builder = PipelineBuilder::new(&self.name);
        if let Some(description) = &self.description {
            builder = builder.description(description);
        }

        for param in &self.parameters {
            builder.param(&param.name, param.data_type, param.default.clone());
        }

        let mut components = HashMap::new();
        for component in &self.components {
            if components.insert(component.name.as_str(), component).is_some() {
                return Err(invalid(format!("component '{}' is defined twice", component.name)));
            }
        }

        let mut defined = HashSet::new();
        define_entries(&mut builder, &self.tasks, &components, &mut defined)?;
        Ok(builder)
    }

    /// Load and seal in one step
    pub fn build(&self) -> Result<Pipeline, DagflowError> {
        self.to_builder()?.seal()
    }
}

fn invalid(reason: String) -> DagflowError {
    DagflowError::InvalidPipeline { reason, help: None }
}

fn define_entries(
    builder: &mut PipelineBuilder,
    entries: &[TaskEntry],
    components: &HashMap<&str, &TaskDefinition>,
    defined: &mut HashSet<String>,
) -> Result<(), DagflowError> {
    for entry in entries {
        match entry {
            TaskEntry::Task(spec) => {
                let component = components.get(spec.component.as_str()).ok_or_else(|| {
                    DagflowError::InvalidPipeline {
                        reason: format!(
                            "task '{}' uses unknown component '{}'",
                            spec.name, spec.component
                        ),
                        help: Some("Declare the component under `components:`".into()),
                    }
                })?;
                if defined.contains(&spec.name) {
                    return Err(invalid(format!("task name '{}' is used twice", spec.name)));
                }

                for binding in spec.inputs.values() {
                    if let Some(task) = binding.producer() {
                        require_defined(defined, &spec.name, task)?;
                    }
                }

                let bindings = spec
                    .inputs
                    .iter()
                    .map(|(input, binding)| (input.as_str(), binding.clone()));
                let handle = builder.define_task_with_resources(&spec.name, component, bindings, &spec.resources);
                defined.insert(handle.id().to_string());
            }
            TaskEntry::Condition(block) => {
                if let GateRef::Output { task, .. } = &block.when.gate {
                    require_defined(defined, "condition", task)?;
                }
                let mut scope = builder.begin_condition(block.when.gate.clone(), block.when.equals.clone());
                define_entries(&mut scope, &block.tasks, components, defined)?;
            }
        }
    }
    Ok(())
}

fn require_defined(defined: &HashSet<String>, node: &str, task: &str) -> Result<(), DagflowError> {
    if defined.contains(task) {
        Ok(())
    } else {
        Err(DagflowError::UnknownTask {
            node: node.to_string(),
            task: task.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{DataType, ParamValue};

    const PIPELINE: &str = r#"
version: "1"
name: gated
parameters:
  - name: threshold
    type: float
    default: 0.8
components:
  - name: score
    outputs:
      - name: accuracy
        type: float
      - name: passed
        type: bool
    body:
      type: shell
      command: |
        echo '{"accuracy": 0.9, "passed": true}'
  - name: publish
    inputs:
      - name: accuracy
        type: float
      - name: threshold
        type: float
    body:
      type: shell
      command: "true"
tasks:
  - name: score
    component: score
  - when:
      gate: { task: score, output: passed }
      equals: true
    tasks:
      - name: publish
        component: publish
        inputs:
          accuracy: { task: score, output: accuracy }
          threshold: { param: threshold }
        resources:
          cpu_request: 250m
      - when:
          gate: { param: threshold }
          equals: 0.8
        tasks:
          - name: publish_strict
            component: publish
            inputs:
              accuracy: { task: score, output: accuracy }
              threshold: 0.95
"#;

    #[test]
    fn test_parse_and_build_nested_conditions() {
        let file = PipelineFile::from_yaml(PIPELINE).unwrap();
        assert_eq!(file.tasks.len(), 2);
        assert!(matches!(file.tasks[1], TaskEntry::Condition(_)));

        let pipeline = file.build().unwrap();
        assert_eq!(pipeline.nodes().len(), 3);

        let publish = pipeline.node("publish").unwrap();
        assert_eq!(publish.condition().all.len(), 1);
        assert_eq!(publish.resources().cpu_request().unwrap().to_string(), "250m");

        let strict = pipeline.node("publish_strict").unwrap();
        assert_eq!(strict.condition().all.len(), 2);
        assert_eq!(
            strict.bindings()["threshold"],
            Binding::Literal(ParamValue::Float(0.95))
        );
        assert_eq!(pipeline.params()[0].data_type, DataType::Float);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let yaml = r#"
name: forward
components:
  - name: c
    inputs: [{ name: x, type: int }]
    outputs: [{ name: y, type: int }]
    body: { type: shell, command: "true" }
tasks:
  - name: first
    component: c
    inputs:
      x: { task: second, output: y }
  - name: second
    component: c
    inputs:
      x: 1
"#;
        let file = PipelineFile::from_yaml(yaml).unwrap();
        assert!(matches!(
            file.to_builder(),
            Err(DagflowError::UnknownTask { node, task }) if node == "first" && task == "second"
        ));
    }

    #[test]
    fn test_unknown_component() {
        let yaml = "name: p\ntasks:\n  - name: a\n    component: nope\n";
        let file = PipelineFile::from_yaml(yaml).unwrap();
        assert!(matches!(file.build(), Err(DagflowError::InvalidPipeline { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = PipelineFile::from_file(Path::new("/nonexistent/pipeline.yaml"));
        assert!(matches!(result, Err(DagflowError::PipelineNotFound { .. })));
    }

    #[test]
    fn test_round_trip_yaml() {
        let file = PipelineFile::from_yaml(PIPELINE).unwrap();
        let yaml = file.to_yaml().unwrap();
        let parsed = PipelineFile::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.name, file.name);
        assert_eq!(parsed.build().unwrap().nodes().len(), 3);
    }
}
