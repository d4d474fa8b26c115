// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Pipeline definitions and construction
//!
//! This module defines task definitions, resource profiles, the pipeline
//! builder with its conditional scopes, dependency graphs, validation and
//! the YAML pipeline file format.

mod builder;
mod condition;
mod dag;
mod definition;
mod file;
mod resources;
mod validation;

pub use builder::{
    Binding, InputRef, OutputRef, ParamRef, Pipeline, PipelineBuilder, TaskBuilder, TaskHandle, TaskNode,
};
pub use condition::{Condition, ConditionClause, ConditionScope, GateRef};
pub use dag::TaskGraph;
pub use definition::{BodyRef, InputSpec, OutputSpec, ParameterSpec, TaskDefinition};
pub use file::{ConditionBlock, PipelineFile, TaskEntry, TaskSpec};
pub use resources::{CpuQuantity, MemoryQuantity, ResourceProfile};
pub use validation::{PipelineValidator, ValidationResult};

pub(crate) use builder::derive_edges;
