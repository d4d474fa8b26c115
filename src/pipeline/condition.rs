// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Conditional scopes
//!
//! Tasks defined while a [`ConditionScope`] is open run only when the gate
//! value equals the expected value. Nested scopes conjoin their clauses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::builder::{OutputRef, ParamRef, PipelineBuilder};
use crate::artifact::ParamValue;

/// The value a condition is evaluated on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateRef {
    /// An external parameter
    Param { param: String },
    /// A task output
    Output { task: String, output: String },
}

impl GateRef {
    /// Producing node, if the gate is a task output
    pub fn producer(&self) -> Option<&str> {
        match self {
            GateRef::Output { task, .. } => Some(task),
            GateRef::Param { .. } => None,
        }
    }
}

impl From<OutputRef> for GateRef {
    fn from(r: OutputRef) -> Self {
        GateRef::Output {
            task: r.node,
            output: r.output,
        }
    }
}

impl From<ParamRef> for GateRef {
    fn from(r: ParamRef) -> Self {
        GateRef::Param { param: r.0 }
    }
}

impl fmt::Display for GateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRef::Param { param } => write!(f, "params.{}", param),
            GateRef::Output { task, output } => write!(f, "{}.{}", task, output),
        }
    }
}

/// One `gate == equals` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionClause {
    pub gate: GateRef,
    pub equals: ParamValue,
}

impl fmt::Display for ConditionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == {}", self.gate, self.equals)
    }
}

/// Conjunction of clauses guarding a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub all: Vec<ConditionClause>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Nodes whose outputs the condition reads
    pub fn producers(&self) -> impl Iterator<Item = &str> {
        self.all.iter().filter_map(|c| c.gate.producer())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.all.iter().map(|c| c.to_string()).collect();
        f.write_str(&clauses.join(" && "))
    }
}

/// RAII guard for an open conditional scope.
///
/// Dereferences to the builder, so tasks are defined through it directly.
/// Dropping the guard closes the scope along with any scope opened inside it.
pub struct ConditionScope<'a> {
    builder: &'a mut PipelineBuilder,
    depth: usize,
}

impl<'a> ConditionScope<'a> {
    pub(crate) fn open(builder: &'a mut PipelineBuilder, clause: ConditionClause) -> Self {
        let depth = builder.scopes.len();
        builder.scopes.push(clause);
        Self { builder, depth }
    }

    /// Close the scope explicitly
    pub fn end(self) {}
}

impl Deref for ConditionScope<'_> {
    type Target = PipelineBuilder;

    fn deref(&self) -> &Self::Target {
        self.builder
    }
}

impl DerefMut for ConditionScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.builder
    }
}

impl Drop for ConditionScope<'_> {
    fn drop(&mut self) {
        self.builder.scopes.truncate(self.depth);
    }
}
