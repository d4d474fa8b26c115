// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! In-memory run tracker

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_node_state, apply_run_status, Experiment, NodeState, RecordOutcome, Run, RunStatus, RunTracker};
use crate::errors::DagflowError;

#[derive(Debug, Default)]
struct State {
    /// Experiments by name
    experiments: HashMap<String, Experiment>,
    /// Runs by id
    runs: HashMap<String, Run>,
    /// Run ids by idempotency key
    keys: HashMap<String, String>,
}

/// Tracker that keeps everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    state: RwLock<State>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunTracker for InMemoryTracker {
    async fn get_or_create_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Experiment, DagflowError> {
        let mut state = self.state.write().await;
        let experiment = state
            .experiments
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(experiment = %name, "Creating experiment");
                Experiment::new(name, description)
            })
            .clone();
        Ok(experiment)
    }

    async fn get_experiment(&self, name: &str) -> Result<Option<Experiment>, DagflowError> {
        Ok(self.state.read().await.experiments.get(name).cloned())
    }

    async fn list_experiments(&self) -> Result<Vec<Experiment>, DagflowError> {
        let mut experiments: Vec<Experiment> = self.state.read().await.experiments.values().cloned().collect();
        experiments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(experiments)
    }

    async fn record_run(&self, run: Run) -> Result<RecordOutcome, DagflowError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.keys.get(&run.idempotency_key) {
            let existing = state.runs.get(existing).cloned().ok_or_else(|| DagflowError::TrackerError {
                message: format!("idempotency key {} points at a missing run", run.idempotency_key),
            })?;
            return Ok(RecordOutcome::Existing(existing));
        }
        state.keys.insert(run.idempotency_key.clone(), run.run_id.clone());
        state.runs.insert(run.run_id.clone(), run);
        Ok(RecordOutcome::Created)
    }

    async fn update_node_status(&self, run_id: &str, node_id: &str, node: NodeState) -> Result<(), DagflowError> {
        let mut state = self.state.write().await;
        let run = state.runs.get_mut(run_id).ok_or_else(|| DagflowError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        apply_node_state(run, node_id, node)
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<(), DagflowError> {
        let mut state = self.state.write().await;
        let run = state.runs.get_mut(run_id).ok_or_else(|| DagflowError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        apply_run_status(run, status);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Run, DagflowError> {
        self.state
            .read()
            .await
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| DagflowError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn list_runs(&self, experiment_id: Option<&str>) -> Result<Vec<Run>, DagflowError> {
        let state = self.state.read().await;
        let mut runs: Vec<Run> = state
            .runs
            .values()
            .filter(|r| experiment_id.map_or(true, |id| r.experiment_id == id))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::NodeStatus;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn run(key: &str) -> Run {
        Run::new("run", "exp", "pipeline", "digest", BTreeMap::new(), key, ["a", "b"])
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_stores_one_experiment() {
        let tracker = Arc::new(InMemoryTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.get_or_create_experiment("x", None).await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(tracker.list_experiments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_run_is_idempotent() {
        let tracker = InMemoryTracker::new();
        let first = run("k1");
        assert_eq!(tracker.record_run(first.clone()).await.unwrap(), RecordOutcome::Created);

        match tracker.record_run(run("k1")).await.unwrap() {
            RecordOutcome::Existing(existing) => assert_eq!(existing.run_id, first.run_id),
            RecordOutcome::Created => panic!("duplicate run recorded"),
        }
        assert_eq!(tracker.list_runs(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_updates() {
        let tracker = InMemoryTracker::new();
        let r = run("k");
        tracker.record_run(r.clone()).await.unwrap();

        tracker
            .update_node_status(&r.run_id, "a", NodeState::new(NodeStatus::Succeeded))
            .await
            .unwrap();
        tracker.update_run_status(&r.run_id, RunStatus::Succeeded).await.unwrap();

        let stored = tracker.get_run(&r.run_id).await.unwrap();
        assert_eq!(stored.node_status("a"), Some(NodeStatus::Succeeded));
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert!(stored.finished_at.is_some());

        assert!(tracker
            .update_node_status(&r.run_id, "zzz", NodeState::pending())
            .await
            .is_err());
        assert!(matches!(
            tracker.get_run("missing").await,
            Err(DagflowError::RunNotFound { .. })
        ));
    }
}
