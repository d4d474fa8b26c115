// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Execution substrates

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{TaskBody, TaskContext, TaskOutputs};

/// Where task bodies actually run.
///
/// The substrate allocates artifact locations and invokes bodies. Resource
/// profiles are handed to it as hints; the local substrate only logs them.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Location a node's artifact output is written to
    fn output_uri(&self, run_id: &str, node_id: &str, output: &str) -> String;

    /// Run a task body
    async fn run(&self, ctx: TaskContext, body: Arc<dyn TaskBody>) -> anyhow::Result<TaskOutputs>;
}

/// Runs bodies in-process on the tokio runtime, with artifacts under a local directory
#[derive(Debug, Clone)]
pub struct LocalSubstrate {
    artifact_root: PathBuf,
}

impl LocalSubstrate {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        let root = artifact_root.into();
        let artifact_root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir().map(|cwd| cwd.join(&root)).unwrap_or(root)
        };
        Self { artifact_root }
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    fn node_dir(&self, run_id: &str, node_id: &str) -> PathBuf {
        self.artifact_root.join(run_id).join(node_id)
    }
}

#[async_trait]
impl Substrate for LocalSubstrate {
    fn output_uri(&self, run_id: &str, node_id: &str, output: &str) -> String {
        format!("file://{}", self.node_dir(run_id, node_id).join(output).display())
    }

    async fn run(&self, ctx: TaskContext, body: Arc<dyn TaskBody>) -> anyhow::Result<TaskOutputs> {
        if !ctx.output_uris.is_empty() {
            let dir = self.node_dir(&ctx.run_id, &ctx.node_id);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create artifact directory {}", dir.display()))?;
        }
        debug!(node = %ctx.node_id, resources = %ctx.resources, "Invoking task body");
        body.invoke(ctx).await
    }
}

/// Local filesystem path of a `file://` URI
pub fn local_path(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}
