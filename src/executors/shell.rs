// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Shell command task body

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::debug;

use super::{local_path, TaskBody, TaskContext, TaskOutputs};
use crate::artifact::{ParamValue, Value};
use crate::errors::DagflowError;

/// Runs a shell command.
///
/// Inputs are exported as `DAGFLOW_INPUT_<NAME>` and artifact output locations
/// as `DAGFLOW_OUTPUT_<NAME>`. Artifacts stored as local files also get a
/// `_PATH` variable. If the last line of stdout is a JSON object, its fields become the
/// task's outputs. Artifact outputs not mentioned there default to their
/// allocated location.
#[derive(Debug, Clone)]
pub struct ShellBody {
    command: String,
    shell: String,
    env: BTreeMap<String, String>,
}

impl ShellBody {
    pub fn new(command: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: shell.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl TaskBody for ShellBody {
    async fn invoke(&self, ctx: TaskContext) -> anyhow::Result<TaskOutputs> {
        let shell = which::which(&self.shell).map_err(|_| DagflowError::tool_not_found(&self.shell))?;

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(&self.command);
        cmd.envs(&self.env);
        cmd.env("DAGFLOW_RUN_ID", &ctx.run_id);
        cmd.env("DAGFLOW_NODE_ID", &ctx.node_id);
        for (name, value) in &ctx.inputs {
            let key = env_key("DAGFLOW_INPUT_", name);
            if let Some(path) = value.as_artifact().and_then(|a| local_path(&a.uri)) {
                cmd.env(format!("{}_PATH", key), path);
            }
            cmd.env(key, env_value(value));
        }
        for (name, uri) in &ctx.output_uris {
            let key = env_key("DAGFLOW_OUTPUT_", name);
            if let Some(path) = local_path(uri) {
                cmd.env(format!("{}_PATH", key), path);
            }
            cmd.env(key, uri);
        }
        // Aborting the node kills the child
        cmd.kill_on_drop(true);

        debug!(node = %ctx.node_id, command = %self.command, "Running shell body");
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.shell))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!("command exited with {}: {}", code, stderr.trim());
        }

        let mut outputs = parse_outputs(&stdout)?;
        for (name, uri) in &ctx.output_uris {
            if !outputs.contains(name) {
                outputs.insert(name.clone(), Value::artifact(uri.clone()));
            }
        }
        Ok(outputs)
    }
}

fn parse_outputs(stdout: &str) -> anyhow::Result<TaskOutputs> {
    let mut outputs = TaskOutputs::new();
    let Some(last) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Ok(outputs);
    };
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(last.trim()) else {
        return Ok(outputs);
    };
    for (name, json) in fields {
        let value: Value = serde_json::from_value(json)
            .with_context(|| format!("output '{}' is not a scalar or artifact", name))?;
        outputs.insert(name, value);
    }
    Ok(outputs)
}

fn env_key(prefix: &str, name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", prefix, suffix)
}

fn env_value(value: &Value) -> String {
    match value {
        Value::Param(ParamValue::String(s)) => s.clone(),
        other => other.to_string(),
    }
}
