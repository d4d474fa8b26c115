// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Task bodies and execution substrates
//!
//! This module provides the [`TaskBody`] trait that domain code implements,
//! the registry bodies are looked up in, and the [`Substrate`] that runs them.

mod shell;
mod substrate;

pub use shell::ShellBody;
pub use substrate::{local_path, LocalSubstrate, Substrate};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::artifact::{ArtifactPayload, Value};
use crate::compiler::Manifest;
use crate::errors::DagflowError;
use crate::pipeline::{BodyRef, ResourceProfile};

/// Everything a task body receives for one invocation
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: String,
    pub node_id: String,
    /// Resolved input values by input name
    pub inputs: BTreeMap<String, Value>,
    /// Pre-allocated locations for artifact outputs by output name
    pub output_uris: BTreeMap<String, String>,
    pub resources: ResourceProfile,
}

impl TaskContext {
    pub fn input(&self, name: &str) -> anyhow::Result<&Value> {
        self.inputs
            .get(name)
            .ok_or_else(|| anyhow!("task '{}' has no input '{}'", self.node_id, name))
    }

    pub fn f64(&self, name: &str) -> anyhow::Result<f64> {
        self.input(name)?
            .as_f64()
            .with_context(|| format!("input '{}' is not a number", name))
    }

    pub fn bool(&self, name: &str) -> anyhow::Result<bool> {
        self.input(name)?
            .as_bool()
            .with_context(|| format!("input '{}' is not a bool", name))
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.input(name)?
            .as_str()
            .with_context(|| format!("input '{}' is not a string", name))
    }

    pub fn artifact(&self, name: &str) -> anyhow::Result<&ArtifactPayload> {
        self.input(name)?
            .as_artifact()
            .with_context(|| format!("input '{}' is not an artifact", name))
    }

    pub fn output_uri(&self, name: &str) -> anyhow::Result<&str> {
        self.output_uris
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("task '{}' has no artifact output '{}'", self.node_id, name))
    }
}

/// Values returned by a task body, by output name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutputs(BTreeMap<String, Value>);

impl TaskOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

/// Domain work executed for a task node.
///
/// Errors become the node's failure reason; they never abort the run.
#[async_trait]
pub trait TaskBody: Send + Sync {
    async fn invoke(&self, ctx: TaskContext) -> anyhow::Result<TaskOutputs>;
}

/// [`TaskBody`] backed by an async closure
pub struct FnBody<F>(F);

#[async_trait]
impl<F, Fut> TaskBody for FnBody<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutputs>> + Send + 'static,
{
    async fn invoke(&self, ctx: TaskContext) -> anyhow::Result<TaskOutputs> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a task body
pub fn body_fn<F, Fut>(f: F) -> Arc<dyn TaskBody>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutputs>> + Send + 'static,
{
    Arc::new(FnBody(f))
}

/// Named task bodies available to the scheduler
#[derive(Clone, Default)]
pub struct BodyRegistry {
    bodies: HashMap<String, Arc<dyn TaskBody>>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body; names must be unique
    pub fn register(&mut self, name: &str, body: Arc<dyn TaskBody>) -> Result<(), DagflowError> {
        if self.bodies.contains_key(name) {
            return Err(DagflowError::DuplicateBody {
                body: name.to_string(),
            });
        }
        self.bodies.insert(name.to_string(), body);
        Ok(())
    }

    /// Register a body, replacing any body with the same name
    pub fn with(mut self, name: &str, body: Arc<dyn TaskBody>) -> Self {
        self.bodies.insert(name.to_string(), body);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskBody>> {
        self.bodies.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bodies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Find the body for a node
    pub fn resolve(&self, node_id: &str, body: &BodyRef) -> Result<Arc<dyn TaskBody>, DagflowError> {
        match body {
            BodyRef::Registered { name } => self.get(name).ok_or_else(|| DagflowError::BodyNotFound {
                body: name.clone(),
                node: node_id.to_string(),
            }),
            BodyRef::Shell { command, shell, env } => Ok(Arc::new(
                ShellBody::new(command, shell).with_env(env.clone()),
            )),
        }
    }

    /// Check that every node of a manifest has a runnable body
    pub fn check(&self, manifest: &Manifest) -> Result<(), DagflowError> {
        for node in &manifest.nodes {
            match &node.body {
                BodyRef::Registered { .. } => {
                    self.resolve(&node.id, &node.body)?;
                }
                BodyRef::Shell { shell, .. } => {
                    which::which(shell).map_err(|_| DagflowError::tool_not_found(shell))?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BodyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyRegistry")
            .field("bodies", &self.names())
            .finish()
    }
}
