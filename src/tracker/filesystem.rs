// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Filesystem-based run tracker
//!
//! Stores experiments and runs as JSON documents under a state directory:
//!
//! ```text
//! <root>/experiments/<hash of name>.json
//! <root>/runs/<run id>.json
//! <root>/keys/<idempotency key>        (contains the run id)
//! ```
//!
//! Experiments and idempotency keys are created with `hard_link`, which fails
//! if the target exists, so creation is atomic across processes. Run documents
//! are rewritten through a temp file and `rename`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{apply_node_state, apply_run_status, Experiment, NodeState, RecordOutcome, Run, RunStatus, RunTracker};
use crate::cache::hash_string;
use crate::errors::DagflowError;

/// Tracker persisting JSON documents on disk
pub struct FilesystemTracker {
    root: PathBuf,
    /// Serializes read-modify-write of run documents within this process
    write_lock: Mutex<()>,
}

impl FilesystemTracker {
    /// Open a tracker rooted at `root`, creating its directories
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DagflowError> {
        let root = root.into();
        for dir in ["experiments", "runs", "keys"] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| DagflowError::TrackerError {
                message: format!("Failed to create tracker directory {}: {}", root.join(dir).display(), e),
            })?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_path(&self, name: &str) -> PathBuf {
        self.root.join("experiments").join(format!("{}.json", hash_string(name)))
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(format!("{}.json", run_id))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join("keys").join(key)
    }

    async fn load_run(&self, run_id: &str) -> Result<Run, DagflowError> {
        read_json(&self.run_path(run_id))
            .await?
            .ok_or_else(|| DagflowError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn modify_run<F>(&self, run_id: &str, f: F) -> Result<(), DagflowError>
    where
        F: FnOnce(&mut Run) -> Result<(), DagflowError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut run = self.load_run(run_id).await?;
        f(&mut run)?;
        write_atomic(&self.run_path(run_id), &to_json(&run)?).await
    }

    async fn read_dir_json<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>, DagflowError> {
        let dir = self.root.join(dir);
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| tracker_error("read", &dir, e))?;
        let mut docs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| tracker_error("read", &dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<T>(&path).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable tracker document"),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl RunTracker for FilesystemTracker {
    async fn get_or_create_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Experiment, DagflowError> {
        let path = self.experiment_path(name);
        let candidate = Experiment::new(name, description);
        if create_if_absent(&path, &to_json(&candidate)?).await? {
            debug!(experiment = %name, id = %candidate.id, "Created experiment");
            return Ok(candidate);
        }
        read_json(&path).await?.ok_or_else(|| DagflowError::TrackerError {
            message: format!("experiment document {} vanished", path.display()),
        })
    }

    async fn get_experiment(&self, name: &str) -> Result<Option<Experiment>, DagflowError> {
        read_json(&self.experiment_path(name)).await
    }

    async fn list_experiments(&self) -> Result<Vec<Experiment>, DagflowError> {
        let mut experiments: Vec<Experiment> = self.read_dir_json("experiments").await?;
        experiments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(experiments)
    }

    async fn record_run(&self, run: Run) -> Result<RecordOutcome, DagflowError> {
        let _guard = self.write_lock.lock().await;
        let run_path = self.run_path(&run.run_id);
        write_atomic(&run_path, &to_json(&run)?).await?;

        let key_path = self.key_path(&run.idempotency_key);
        if create_if_absent(&key_path, run.run_id.as_bytes()).await? {
            debug!(run_id = %run.run_id, "Recorded run");
            return Ok(RecordOutcome::Created);
        }

        let _ = tokio::fs::remove_file(&run_path).await;
        let existing_id = tokio::fs::read_to_string(&key_path)
            .await
            .map_err(|e| tracker_error("read", &key_path, e))?;
        let existing = self.load_run(existing_id.trim()).await?;
        Ok(RecordOutcome::Existing(existing))
    }

    async fn update_node_status(&self, run_id: &str, node_id: &str, state: NodeState) -> Result<(), DagflowError> {
        self.modify_run(run_id, |run| apply_node_state(run, node_id, state)).await
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<(), DagflowError> {
        self.modify_run(run_id, |run| {
            apply_run_status(run, status);
            Ok(())
        })
        .await
    }

    async fn get_run(&self, run_id: &str) -> Result<Run, DagflowError> {
        self.load_run(run_id).await
    }

    async fn list_runs(&self, experiment_id: Option<&str>) -> Result<Vec<Run>, DagflowError> {
        let mut runs: Vec<Run> = self
            .read_dir_json::<Run>("runs")
            .await?
            .into_iter()
            .filter(|r| experiment_id.map_or(true, |id| r.experiment_id == id))
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }
}

fn tracker_error(action: &str, path: &Path, e: std::io::Error) -> DagflowError {
    DagflowError::TrackerError {
        message: format!("Failed to {} {}: {}", action, path.display(), e),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, DagflowError> {
    serde_json::to_vec_pretty(value).map_err(Into::into)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("doc");
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DagflowError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(Into::into),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(tracker_error("read", path, e)),
    }
}

/// Replace `path` with `content` atomically
async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), DagflowError> {
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| tracker_error("write", &tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        tracker_error("rename", path, e)
    })
}

/// Create `path` with `content` unless it exists. Returns whether it was created.
async fn create_if_absent(path: &Path, content: &[u8]) -> Result<bool, DagflowError> {
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| tracker_error("write", &tmp, e))?;
    let linked = tokio::fs::hard_link(&tmp, path).await;
    let _ = tokio::fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(tracker_error("create", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::NodeStatus;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn run(key: &str) -> Run {
        Run::new("run", "exp", "pipeline", "digest", BTreeMap::new(), key, ["a"])
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_stores_one_experiment() {
        let temp = TempDir::new().unwrap();
        let tracker = Arc::new(FilesystemTracker::new(temp.path()).unwrap());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.get_or_create_experiment("x", Some("d")).await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let experiments = tracker.list_experiments().await.unwrap();
        assert_eq!(experiments.len(), 1);
        assert_eq!(experiments[0].description.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_runs_persist_across_instances() {
        let temp = TempDir::new().unwrap();
        let r = run("key");
        {
            let tracker = FilesystemTracker::new(temp.path()).unwrap();
            tracker.record_run(r.clone()).await.unwrap();
            tracker
                .update_node_status(&r.run_id, "a", NodeState::new(NodeStatus::Succeeded))
                .await
                .unwrap();
            tracker.update_run_status(&r.run_id, RunStatus::Succeeded).await.unwrap();
        }

        let reopened = FilesystemTracker::new(temp.path()).unwrap();
        let stored = reopened.get_run(&r.run_id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.node_status("a"), Some(NodeStatus::Succeeded));
        assert_eq!(reopened.list_runs(Some("exp")).await.unwrap().len(), 1);
        assert!(reopened.list_runs(Some("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let tracker = FilesystemTracker::new(temp.path()).unwrap();
        let first = run("same");
        tracker.record_run(first.clone()).await.unwrap();

        let second = run("same");
        match tracker.record_run(second.clone()).await.unwrap() {
            RecordOutcome::Existing(existing) => assert_eq!(existing.run_id, first.run_id),
            RecordOutcome::Created => panic!("duplicate run recorded"),
        }
        assert!(matches!(
            tracker.get_run(&second.run_id).await,
            Err(DagflowError::RunNotFound { .. })
        ));
        assert_eq!(tracker.list_runs(None).await.unwrap().len(), 1);
    }
}
