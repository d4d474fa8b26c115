// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Submission and status interface
//!
//! [`Orchestrator`] accepts manifests, records runs idempotently and executes
//! them in the background.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::artifact::ParamValue;
use crate::cache::{ContentHasher, ManifestStore};
use crate::compiler::Manifest;
use crate::errors::DagflowError;
use crate::scheduler::{bind_parameters, Scheduler};
use crate::tracker::{Experiment, RecordOutcome, Run, RunStatus, RunSummary, RunTracker};

/// Manifest to run: inline, or a digest in the manifest store
#[derive(Debug, Clone)]
pub enum ManifestSource {
    Inline(Manifest),
    Ref(String),
}

impl From<Manifest> for ManifestSource {
    fn from(manifest: Manifest) -> Self {
        ManifestSource::Inline(manifest)
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Front door for submitting and observing runs
pub struct Orchestrator {
    scheduler: Arc<Scheduler>,
    manifests: Arc<dyn ManifestStore>,
    active: Arc<Mutex<HashMap<String, ActiveRun>>>,
}

impl Orchestrator {
    pub fn new(scheduler: Scheduler, manifests: Arc<dyn ManifestStore>) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            manifests,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn tracker(&self) -> &Arc<dyn RunTracker> {
        self.scheduler.tracker()
    }

    pub fn manifests(&self) -> &Arc<dyn ManifestStore> {
        &self.manifests
    }

    /// Create an experiment up front, e.g. to give it a description
    pub async fn create_experiment(&self, name: &str, description: Option<&str>) -> Result<Experiment, DagflowError> {
        self.tracker().get_or_create_experiment(name, description).await
    }

    /// Submit a run and return its id without waiting for it.
    ///
    /// Resubmitting the same manifest with the same experiment, run name and
    /// parameters returns the id of the original run.
    pub async fn submit(
        &self,
        source: impl Into<ManifestSource>,
        experiment: &str,
        run_name: &str,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<String, DagflowError> {
        let manifest = match source.into() {
            ManifestSource::Inline(manifest) => {
                manifest.validate()?;
                self.manifests.store(&manifest).await?;
                manifest
            }
            ManifestSource::Ref(reference) => {
                let manifest = self.manifests.fetch(&reference).await?;
                manifest.validate()?;
                manifest
            }
        };
        let digest = manifest.digest()?;
        let params = bind_parameters(&manifest.parameters, &params)?;
        self.scheduler.bodies().check(&manifest)?;

        let experiment = self.tracker().get_or_create_experiment(experiment, None).await?;
        let key = ContentHasher::idempotency_key(&experiment.id, run_name, &digest, &params)?;
        let run = Run::new(
            run_name,
            &experiment.id,
            manifest.name(),
            &digest,
            params,
            &key,
            manifest.nodes.iter().map(|n| n.id.as_str()),
        );

        if let RecordOutcome::Existing(existing) = self.tracker().record_run(run.clone()).await? {
            info!(run_id = %existing.run_id, run_name = %run_name, "Run already submitted");
            return Ok(existing.run_id);
        }

        let run_id = run.run_id.clone();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.active.lock().await.insert(
            run_id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        info!(run_id = %run_id, experiment = %experiment.name, pipeline = %manifest.name(), "Submitted run");
        let scheduler = self.scheduler.clone();
        let active = self.active.clone();
        let manifest = Arc::new(manifest);
        tokio::spawn(async move {
            let id = run.run_id.clone();
            if let Err(e) = scheduler.drive(manifest, run, cancel).await {
                error!(run_id = %id, error = %e, "Run aborted");
                let _ = scheduler.tracker().update_run_status(&id, RunStatus::Failed).await;
            }
            active.lock().await.remove(&id);
            let _ = done_tx.send(true);
        });

        Ok(run_id)
    }

    /// Overall and per-node status
    pub async fn get_status(&self, run_id: &str) -> Result<RunSummary, DagflowError> {
        let run = self.tracker().get_run(run_id).await?;
        Ok(RunSummary::from(&run))
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Run, DagflowError> {
        self.tracker().get_run(run_id).await
    }

    /// Wait until a run is terminal
    pub async fn wait(&self, run_id: &str) -> Result<Run, DagflowError> {
        let done = self.active.lock().await.get(run_id).map(|a| a.done.clone());
        if let Some(mut done) = done {
            // A dropped sender also means the run is over
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.tracker().get_run(run_id).await
    }

    /// Request cancellation. Returns false if the run is not executing here.
    pub async fn cancel(&self, run_id: &str) -> Result<bool, DagflowError> {
        if let Some(active) = self.active.lock().await.get(run_id) {
            info!(run_id = %run_id, "Cancelling run");
            active.cancel.cancel();
            return Ok(true);
        }
        self.tracker().get_run(run_id).await?;
        Ok(false)
    }
}
