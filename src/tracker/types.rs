// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Records kept by the run tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::artifact::{ParamValue, Value};

/// Named grouping of runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(name: &str, description: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Status of one node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Recorded state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: NodeStatus,
    /// Skipped because the run was cancelled
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl NodeState {
    pub fn new(status: NodeStatus) -> Self {
        Self {
            status,
            cancelled: false,
            reason: None,
            started_at: None,
            finished_at: None,
            outputs: BTreeMap::new(),
        }
    }

    pub fn pending() -> Self {
        Self::new(NodeStatus::Pending)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::pending()
    }
}

/// One execution of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub pipeline_name: String,
    /// Digest of the executed manifest
    pub manifest_ref: String,
    /// Submitted parameters after defaults and coercion
    pub params: BTreeMap<String, ParamValue>,
    pub status: RunStatus,
    pub nodes: BTreeMap<String, NodeState>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// New pending run with every node pending
    pub fn new<'a>(
        run_name: &str,
        experiment_id: &str,
        pipeline_name: &str,
        manifest_ref: &str,
        params: BTreeMap<String, ParamValue>,
        idempotency_key: &str,
        node_ids: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_name: run_name.to_string(),
            experiment_id: experiment_id.to_string(),
            pipeline_name: pipeline_name.to_string(),
            manifest_ref: manifest_ref.to_string(),
            params,
            status: RunStatus::Pending,
            nodes: node_ids
                .into_iter()
                .map(|id| (id.to_string(), NodeState::pending()))
                .collect(),
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.nodes.get(id)
    }

    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(|n| n.status)
    }

    /// Number of nodes in the given status
    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }

    /// Number of nodes that reached a terminal status
    pub fn finished_nodes(&self) -> usize {
        self.nodes.values().filter(|n| n.status.is_terminal()).count()
    }

    /// Derive the overall status from node states.
    ///
    /// Failed wins over cancelled, which wins over succeeded.
    pub fn final_status(&self) -> RunStatus {
        if self.count(NodeStatus::Failed) > 0 {
            RunStatus::Failed
        } else if self.nodes.values().any(|n| n.cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        }
    }
}

/// Result of recording a run
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The run was stored
    Created,
    /// A run with the same idempotency key already exists
    Existing(Run),
}

/// Status snapshot returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub nodes: BTreeMap<String, NodeStatus>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            nodes: run.nodes.iter().map(|(id, n)| (id.clone(), n.status)).collect(),
        }
    }
}
