// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Error types with actionable diagnostics
//!
//! Build and compile errors point at the offending node, input or edge so
//! that a broken pipeline can be fixed without reading the orchestrator's
//! source. Task body failures are not errors of this type: they are recorded
//! on the node's state and surfaced through the status interface.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::artifact::DataType;

/// Result type for dagflow operations
pub type DagflowResult<T> = Result<T, DagflowError>;

/// Main error type for dagflow
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum DagflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cyclic dependency detected: {}", format_cycle(.cycle))]
    #[diagnostic(
        code(dagflow::cyclic_graph),
        help("Remove one of the connections between these tasks")
    )]
    CyclicGraph { cycle: Vec<String> },

    #[error("Task '{node}' input '{input}' expects {expected} but is bound to {actual}")]
    #[diagnostic(code(dagflow::type_mismatch))]
    TypeMismatch {
        node: String,
        input: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Task '{node}' input '{input}' is not bound and has no default")]
    #[diagnostic(
        code(dagflow::unbound_input),
        help("Bind '{input}' to a pipeline parameter, another task's output or a literal")
    )]
    UnboundInput { node: String, input: String },

    #[error("Task '{node}' references unknown parameter '{parameter}'")]
    #[diagnostic(
        code(dagflow::unknown_parameter),
        help("Declare '{parameter}' in the pipeline parameters")
    )]
    UnknownParameter { node: String, parameter: String },

    #[error("Task '{node}' input '{input}' references unknown output '{task}.{output}'")]
    #[diagnostic(code(dagflow::unknown_output))]
    UnknownOutput {
        node: String,
        input: String,
        task: String,
        output: String,
    },

    #[error("Task '{node}' binds '{input}', which component '{component}' does not declare")]
    #[diagnostic(code(dagflow::unknown_input))]
    UnknownInput {
        node: String,
        input: String,
        component: String,
    },

    #[error("Task '{node}' references task '{task}', which is not defined before it")]
    #[diagnostic(
        code(dagflow::unknown_task),
        help("Tasks can only consume outputs of tasks defined earlier in the pipeline")
    )]
    UnknownTask { node: String, task: String },

    #[error("Parameter '{parameter}' is declared more than once")]
    #[diagnostic(code(dagflow::duplicate_parameter))]
    DuplicateParameter { parameter: String },

    #[error("Pipeline '{pipeline}' has no tasks")]
    #[diagnostic(code(dagflow::empty_pipeline))]
    EmptyPipeline { pipeline: String },

    #[error("Invalid resource quantity '{value}': {reason}")]
    #[diagnostic(
        code(dagflow::invalid_quantity),
        help("Use Kubernetes notation, e.g. cpu \"500m\" or \"2\", memory \"512Mi\" or \"1Gi\"")
    )]
    InvalidQuantity { value: String, reason: String },

    #[error("Invalid pipeline definition: {reason}")]
    #[diagnostic(code(dagflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(dagflow::pipeline_not_found),
        help("Pass the path of a pipeline YAML file, or a compiled manifest with --manifest")
    )]
    PipelineNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────────────────
    // Compile Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline is not in a compilable state: {reason}")]
    #[diagnostic(code(dagflow::precompiled_state))]
    PrecompiledState { reason: String },

    #[error("Invalid manifest: {reason}")]
    #[diagnostic(code(dagflow::invalid_manifest))]
    InvalidManifest { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Submission Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Required parameter '{parameter}' was not supplied")]
    #[diagnostic(
        code(dagflow::missing_parameter),
        help("Supply it with --param {parameter}=<value>")
    )]
    MissingParameter { parameter: String },

    #[error("Parameter '{parameter}' is not declared by the pipeline")]
    #[diagnostic(code(dagflow::unexpected_parameter))]
    UnexpectedParameter { parameter: String },

    #[error("Parameter '{parameter}' expects {expected}, got {actual}")]
    #[diagnostic(code(dagflow::parameter_type))]
    ParameterType {
        parameter: String,
        expected: DataType,
        actual: String,
    },

    #[error("Manifest '{reference}' not found")]
    #[diagnostic(
        code(dagflow::manifest_not_found),
        help("List stored manifests with 'dagflow manifests list'")
    )]
    ManifestNotFound { reference: String },

    #[error("Run '{run_id}' not found")]
    #[diagnostic(code(dagflow::run_not_found))]
    RunNotFound { run_id: String },

    #[error("No task body registered as '{body}' (needed by task '{node}')")]
    #[diagnostic(code(dagflow::body_not_found))]
    BodyNotFound { body: String, node: String },

    #[error("A task body named '{body}' is already registered")]
    #[diagnostic(code(dagflow::duplicate_body))]
    DuplicateBody { body: String },

    #[error("Tool '{tool}' not found")]
    #[diagnostic(code(dagflow::tool_not_found), help("{suggestion}"))]
    ToolNotFound { tool: String, suggestion: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Run tracker error: {message}")]
    #[diagnostic(code(dagflow::tracker_error))]
    TrackerError { message: String },

    #[error("Manifest cache error: {message}")]
    #[diagnostic(code(dagflow::cache_error))]
    CacheError { message: String },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(dagflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(dagflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(dagflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(dagflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(dagflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(dagflow::toml_error))]
    Toml { message: String },
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} → {}", cycle.join(" → "), first),
        None => String::new(),
    }
}

impl From<std::io::Error> for DagflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for DagflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for DagflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for DagflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl DagflowError {
    /// Create a tool not found error with installation suggestion
    pub fn tool_not_found(tool: &str) -> Self {
        Self::ToolNotFound {
            tool: tool.to_string(),
            suggestion: format!("Install {} and ensure it's in your PATH", tool),
        }
    }

    /// Whether this error is raised while building or sealing a pipeline
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::CyclicGraph { .. }
                | Self::TypeMismatch { .. }
                | Self::UnboundInput { .. }
                | Self::UnknownParameter { .. }
                | Self::UnknownOutput { .. }
                | Self::UnknownInput { .. }
                | Self::UnknownTask { .. }
                | Self::DuplicateParameter { .. }
                | Self::EmptyPipeline { .. }
        )
    }

    /// The task node the error points at, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::TypeMismatch { node, .. }
            | Self::UnboundInput { node, .. }
            | Self::UnknownParameter { node, .. }
            | Self::UnknownOutput { node, .. }
            | Self::UnknownInput { node, .. }
            | Self::UnknownTask { node, .. }
            | Self::BodyNotFound { node, .. } => Some(node),
            _ => None,
        }
    }
}
