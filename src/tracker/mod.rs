// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Run tracking
//!
//! Experiments and runs are persisted through the [`RunTracker`] trait.
//! Experiment creation and run recording are atomic conditional inserts, so
//! concurrent or repeated submissions never produce duplicates.

mod filesystem;
mod memory;
mod types;

pub use filesystem::FilesystemTracker;
pub use memory::InMemoryTracker;
pub use types::{Experiment, NodeState, NodeStatus, RecordOutcome, Run, RunStatus, RunSummary};

use async_trait::async_trait;

use crate::errors::DagflowError;

/// Storage for experiments and runs
#[async_trait]
pub trait RunTracker: Send + Sync {
    /// Return the experiment with this name, creating it if absent
    async fn get_or_create_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Experiment, DagflowError>;

    async fn get_experiment(&self, name: &str) -> Result<Option<Experiment>, DagflowError>;

    async fn list_experiments(&self) -> Result<Vec<Experiment>, DagflowError>;

    /// Store a run unless one with the same idempotency key exists
    async fn record_run(&self, run: Run) -> Result<RecordOutcome, DagflowError>;

    /// Replace the recorded state of one node
    async fn update_node_status(&self, run_id: &str, node_id: &str, state: NodeState) -> Result<(), DagflowError>;

    /// Set the overall status; terminal statuses also stamp `finished_at`
    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<(), DagflowError>;

    async fn get_run(&self, run_id: &str) -> Result<Run, DagflowError>;

    /// Runs, oldest first, optionally restricted to one experiment id
    async fn list_runs(&self, experiment_id: Option<&str>) -> Result<Vec<Run>, DagflowError>;
}

/// Apply a node update to a run, rejecting unknown nodes
pub(crate) fn apply_node_state(run: &mut Run, node_id: &str, state: NodeState) -> Result<(), DagflowError> {
    match run.nodes.get_mut(node_id) {
        Some(slot) => {
            *slot = state;
            Ok(())
        }
        None => Err(DagflowError::TrackerError {
            message: format!("run '{}' has no node '{}'", run.run_id, node_id),
        }),
    }
}

pub(crate) fn apply_run_status(run: &mut Run, status: RunStatus) {
    run.status = status;
    if status.is_terminal() && run.finished_at.is_none() {
        run.finished_at = Some(chrono::Utc::now());
    }
}
