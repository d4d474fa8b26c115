// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Per-run node table and node failure reasons

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::artifact::DataType;
use crate::tracker::{NodeState, NodeStatus};

/// Why a node failed. Rendered into the node's recorded reason.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("UnresolvedCondition: gate '{gate}' has no usable value")]
    UnresolvedCondition { gate: String },

    #[error("UnresolvedInput: input '{input}' has no value")]
    UnresolvedInput { input: String },

    #[error("input '{input}' expects {expected}, got {actual}")]
    InputType {
        input: String,
        expected: DataType,
        actual: String,
    },

    #[error("output '{output}' was not produced")]
    MissingOutput { output: String },

    #[error("output '{output}' expects {expected}, got {actual}")]
    OutputType {
        output: String,
        expected: DataType,
        actual: String,
    },

    #[error("no body available: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Body(String),

    #[error("task body panicked")]
    Panicked,
}

/// Node states of one run.
///
/// Every change goes through a compare-and-set on the current status, so a
/// node can only be claimed for execution once.
#[derive(Debug)]
pub(crate) struct NodeTable {
    nodes: Mutex<HashMap<String, NodeState>>,
}

impl NodeTable {
    pub fn new(nodes: &BTreeMap<String, NodeState>) -> Self {
        Self {
            nodes: Mutex::new(nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NodeState>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.lock().get(id).map(|n| n.status)
    }

    /// Move `id` from `from` to `to`, letting `update` fill in details.
    ///
    /// Returns the new state, or `None` if the node was not in `from`.
    pub fn transition(
        &self,
        id: &str,
        from: NodeStatus,
        to: NodeStatus,
        update: impl FnOnce(&mut NodeState),
    ) -> Option<NodeState> {
        let mut nodes = self.lock();
        let node = nodes.get_mut(id)?;
        if node.status != from {
            return None;
        }
        node.status = to;
        match to {
            NodeStatus::Running => node.started_at = Some(Utc::now()),
            s if s.is_terminal() => node.finished_at = Some(Utc::now()),
            _ => {}
        }
        update(node);
        Some(node.clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, NodeState> {
        self.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
