// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from build errors.

use super::DagflowError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for an error, if one applies
    pub fn for_error(error: &DagflowError) -> Option<Self> {
        match error {
            DagflowError::CyclicGraph { cycle } => Some(Self::fix_cycle(cycle)),
            DagflowError::UnboundInput { node, input } => Some(Self::bind_input(node, input)),
            DagflowError::TypeMismatch {
                node,
                input,
                expected,
                actual,
            } => Some(Self::fix_binding_type(
                node,
                input,
                &expected.to_string(),
                &actual.to_string(),
            )),
            DagflowError::UnknownParameter { parameter, .. }
            | DagflowError::MissingParameter { parameter } => Some(Self::declare_parameter(parameter)),
            DagflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            DagflowError::ToolNotFound { tool, .. } => Some(Self::install_tool(tool)),
            _ => None,
        }
    }

    /// Suggest installing a missing tool
    pub fn install_tool(tool: &str) -> Self {
        Self {
            action: format!("Install {}", tool),
            steps: vec![
                format!("Shell task bodies run through '{}'", tool),
                format!("Install {} and ensure it's in your PATH", tool),
                "Or set `shell:` on the component to an interpreter you have".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest breaking a dependency cycle
    pub fn fix_cycle(cycle: &[String]) -> Self {
        let mut path = cycle.to_vec();
        if let Some(first) = cycle.first() {
            path.push(first.clone());
        }

        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", path.join(" → ")),
                "A task cannot consume, directly or transitively, its own output".into(),
                "Rebind one input in the cycle to a parameter or an upstream task".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "dagflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest binding an input that has no value source
    pub fn bind_input(node: &str, input: &str) -> Self {
        Self {
            action: format!("Bind input '{}' of task '{}'", input, node),
            steps: vec![
                "Every input without a default must be bound to one of:".into(),
                "  • a pipeline parameter:   { param: <name> }".into(),
                "  • another task's output:  { task: <task>, output: <name> }".into(),
                "  • a literal value:        0.2, true, \"text\"".into(),
                "Alternatively give the input a default in its component".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest fixing a binding whose type does not match the input
    pub fn fix_binding_type(node: &str, input: &str, expected: &str, actual: &str) -> Self {
        let mut steps = vec![format!(
            "'{}.{}' is declared as {} but receives {}",
            node, input, expected, actual
        )];
        if input == "condition" {
            steps.push("The expected value of a condition must have the gate's type".into());
        } else {
            steps.push("Bind the input to an output or parameter of the declared type".into());
            if expected == "float" {
                steps.push("Only int values widen to float implicitly".into());
            }
        }

        Self {
            action: format!("Fix the type of '{}.{}'", node, input),
            steps,
            commands: vec![],
        }
    }

    /// Suggest declaring a parameter
    pub fn declare_parameter(parameter: &str) -> Self {
        Self {
            action: format!("Declare or supply parameter '{}'", parameter),
            steps: vec![
                "Add it to the pipeline's `parameters:` list with a type".into(),
                "Give it a default, or pass it when submitting".into(),
            ],
            commands: vec![format!("dagflow run --param {}=<value>", parameter)],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline definition".into(),
            steps: vec![
                "No pipeline.yaml found in current directory".into(),
                "Pass a path explicitly, or run a compiled manifest".into(),
            ],
            commands: vec![
                "dagflow validate path/to/pipeline.yaml".into(),
                "dagflow run --manifest manifest.json".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::DataType;

    #[test]
    fn test_cycle_suggestion_shows_closed_path() {
        let err = DagflowError::CyclicGraph {
            cycle: vec!["a".into(), "b".into()],
        };
        let suggestion = RecoverySuggestion::for_error(&err).unwrap();
        assert!(suggestion.to_string().contains("a → b → a"));
    }

    #[test]
    fn test_condition_type_suggestion() {
        let err = DagflowError::TypeMismatch {
            node: "deploy".into(),
            input: "condition".into(),
            expected: DataType::Bool,
            actual: DataType::String,
        };
        let text = RecoverySuggestion::for_error(&err).unwrap().to_string();
        assert!(text.contains("gate's type"));
    }

    #[test]
    fn test_no_suggestion_for_io() {
        let err = DagflowError::Io {
            message: "disk full".into(),
        };
        assert!(RecoverySuggestion::for_error(&err).is_none());
    }
}
