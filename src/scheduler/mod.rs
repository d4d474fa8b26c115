// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Manifest execution
//!
//! The scheduler walks a manifest in topological order, moving each node
//! through `Pending -> Ready -> Running -> {Succeeded, Failed, Skipped}`.
//! Ready nodes run concurrently on a bounded worker pool; every transition is
//! written through to the run tracker.

mod params;
mod state;

pub use params::bind_parameters;
pub use state::NodeError;

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactId, ArtifactStore, ParamValue, Value};
use crate::compiler::{Manifest, ManifestNode};
use crate::errors::DagflowError;
use crate::executors::{BodyRegistry, Substrate, TaskContext, TaskOutputs};
use crate::pipeline::{Binding, GateRef, TaskGraph};
use crate::tracker::{NodeState, NodeStatus, Run, RunStatus, RunTracker};
use state::NodeTable;

/// Experiment used when the caller does not name one
pub const DEFAULT_EXPERIMENT: &str = "Default";

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of task bodies running at once
    pub max_workers: usize,
    /// How long running nodes may continue after cancellation
    pub cancel_grace: Duration,
}

impl SchedulerConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            cancel_grace: Duration::from_secs(30),
        }
    }
}

type NodeOutcome = anyhow::Result<TaskOutputs>;

/// Executes manifests against a body registry, a substrate and a tracker
pub struct Scheduler {
    bodies: BodyRegistry,
    substrate: Arc<dyn Substrate>,
    tracker: Arc<dyn RunTracker>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        bodies: BodyRegistry,
        substrate: Arc<dyn Substrate>,
        tracker: Arc<dyn RunTracker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            bodies,
            substrate,
            tracker,
            config,
        }
    }

    pub fn bodies(&self) -> &BodyRegistry {
        &self.bodies
    }

    pub fn tracker(&self) -> &Arc<dyn RunTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute a manifest to completion in the default experiment
    pub async fn execute(
        &self,
        manifest: &Manifest,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<Run, DagflowError> {
        manifest.validate()?;
        let params = bind_parameters(&manifest.parameters, &params)?;
        self.bodies.check(manifest)?;

        let experiment = self
            .tracker
            .get_or_create_experiment(DEFAULT_EXPERIMENT, None)
            .await?;
        let digest = manifest.digest()?;
        let run = Run::new(
            manifest.name(),
            &experiment.id,
            manifest.name(),
            &digest,
            params,
            &uuid::Uuid::new_v4().to_string(),
            manifest.nodes.iter().map(|n| n.id.as_str()),
        );
        self.tracker.record_run(run.clone()).await?;
        self.drive(Arc::new(manifest.clone()), run, CancellationToken::new())
            .await
    }

    /// Run a recorded run until every node is terminal
    pub(crate) async fn drive(
        &self,
        manifest: Arc<Manifest>,
        mut run: Run,
        cancel: CancellationToken,
    ) -> Result<Run, DagflowError> {
        let graph = manifest.graph();
        let order = graph.topological_order()?;
        let mut artifacts = seed_artifacts(&manifest, &run);
        let table = NodeTable::new(&run.nodes);
        let run_id = run.run_id.clone();

        info!(run_id = %run_id, pipeline = %manifest.name(), nodes = order.len(), "Starting run");
        self.tracker.update_run_status(&run_id, RunStatus::Running).await?;

        let mut join_set: JoinSet<NodeOutcome> = JoinSet::new();
        let mut running: HashMap<Id, String> = HashMap::new();
        let mut grace_deadline: Option<Instant> = None;
        let mut aborted = false;

        loop {
            if cancel.is_cancelled() {
                if grace_deadline.is_none() {
                    info!(run_id = %run_id, running = running.len(), "Run cancelled");
                    grace_deadline = Some(Instant::now() + self.config.cancel_grace);
                }
                self.skip_unstarted(&order, &table, &run_id).await;
            } else {
                self.resolve_pending(&manifest, &graph, &order, &table, &artifacts, &run_id)
                    .await;
                self.start_ready(&manifest, &order, &table, &artifacts, &run_id, &mut join_set, &mut running)
                    .await;
            }

            if join_set.is_empty() {
                break;
            }

            let deadline = grace_deadline.filter(|_| !aborted);
            tokio::select! {
                joined = join_set.join_next_with_id() => {
                    if let Some(joined) = joined {
                        self.finish_node(&manifest, &table, &mut artifacts, &run_id, &mut running, joined)
                            .await;
                    }
                }
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {}
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(run_id = %run_id, running = running.len(), "Cancel grace period elapsed, aborting nodes");
                    join_set.abort_all();
                    aborted = true;
                }
            }
        }

        run.nodes = table.snapshot();
        let status = run.final_status();
        self.tracker.update_run_status(&run_id, status).await?;
        run.status = status;
        run.finished_at = Some(Utc::now());

        info!(
            run_id = %run_id,
            status = %status,
            succeeded = run.count(NodeStatus::Succeeded),
            failed = run.count(NodeStatus::Failed),
            skipped = run.count(NodeStatus::Skipped),
            "Run finished"
        );
        Ok(run)
    }

    /// Decide every pending node whose predecessors are all terminal
    async fn resolve_pending(
        &self,
        manifest: &Manifest,
        graph: &TaskGraph,
        order: &[String],
        table: &NodeTable,
        artifacts: &ArtifactStore,
        run_id: &str,
    ) {
        for id in order {
            if table.status(id) != Some(NodeStatus::Pending) {
                continue;
            }
            let Some(node) = manifest.node(id) else {
                continue;
            };

            let mut blocked = None;
            let mut waiting = false;
            for dep in graph.dependencies(id) {
                match table.status(&dep) {
                    Some(NodeStatus::Succeeded) => {}
                    Some(NodeStatus::Failed) => {
                        blocked = Some(format!("upstream node '{}' failed", dep));
                        break;
                    }
                    Some(NodeStatus::Skipped) => {
                        blocked = Some(format!("upstream node '{}' was skipped", dep));
                        break;
                    }
                    _ => waiting = true,
                }
            }

            let (to, reason) = match blocked {
                Some(reason) => (NodeStatus::Skipped, Some(reason)),
                None if waiting => continue,
                None => match evaluate_condition(node, artifacts) {
                    Ok(true) => (NodeStatus::Ready, None),
                    Ok(false) => (
                        NodeStatus::Skipped,
                        Some(format!("condition not met: {}", node.condition)),
                    ),
                    Err(e) => (NodeStatus::Failed, Some(e.to_string())),
                },
            };

            if let Some(state) = table.transition(id, NodeStatus::Pending, to, move |n| n.reason = reason) {
                match to {
                    NodeStatus::Failed => {
                        warn!(run_id = %run_id, node_id = %id, reason = ?state.reason, "Node failed")
                    }
                    _ => debug!(run_id = %run_id, node_id = %id, status = %to, "Node resolved"),
                }
                self.persist(run_id, id, state).await;
            }
        }
    }

    /// Claim ready nodes and spawn their bodies while workers are free
    #[allow(clippy::too_many_arguments)]
    async fn start_ready(
        &self,
        manifest: &Manifest,
        order: &[String],
        table: &NodeTable,
        artifacts: &ArtifactStore,
        run_id: &str,
        join_set: &mut JoinSet<NodeOutcome>,
        running: &mut HashMap<Id, String>,
    ) {
        for id in order {
            if join_set.len() >= self.config.max_workers {
                break;
            }
            if table.status(id) != Some(NodeStatus::Ready) {
                continue;
            }
            let Some(node) = manifest.node(id) else {
                continue;
            };

            let prepared = self
                .bodies
                .resolve(id, &node.body)
                .map_err(|e| NodeError::Unavailable(e.to_string()))
                .and_then(|body| resolve_inputs(node, artifacts).map(|inputs| (body, inputs)));
            let (body, inputs) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    let reason = e.to_string();
                    warn!(run_id = %run_id, node_id = %id, reason = %reason, "Node failed");
                    if let Some(state) =
                        table.transition(id, NodeStatus::Ready, NodeStatus::Failed, |n| n.reason = Some(reason))
                    {
                        self.persist(run_id, id, state).await;
                    }
                    continue;
                }
            };

            // Losing this claim means the node is already running
            let Some(state) = table.transition(id, NodeStatus::Ready, NodeStatus::Running, |_| {}) else {
                continue;
            };
            self.persist(run_id, id, state).await;

            let ctx = TaskContext {
                run_id: run_id.to_string(),
                node_id: id.clone(),
                inputs,
                output_uris: node
                    .outputs
                    .iter()
                    .filter(|o| o.data_type.is_artifact())
                    .map(|o| (o.name.clone(), self.substrate.output_uri(run_id, id, &o.name)))
                    .collect(),
                resources: node.resources.clone(),
            };
            let substrate = self.substrate.clone();
            let handle = join_set.spawn(async move { substrate.run(ctx, body).await });
            running.insert(handle.id(), id.clone());
            info!(run_id = %run_id, node_id = %id, component = %node.component, "Node started");
        }
    }

    async fn finish_node(
        &self,
        manifest: &Manifest,
        table: &NodeTable,
        artifacts: &mut ArtifactStore,
        run_id: &str,
        running: &mut HashMap<Id, String>,
        joined: Result<(Id, NodeOutcome), JoinError>,
    ) {
        let (task_id, outcome) = match joined {
            Ok((task_id, result)) => (task_id, result.map_err(|e| NodeError::Body(format!("{:#}", e)))),
            Err(e) if e.is_cancelled() => {
                if let Some(id) = running.remove(&e.id()) {
                    warn!(run_id = %run_id, node_id = %id, "Node aborted");
                    if let Some(state) = table.transition(&id, NodeStatus::Running, NodeStatus::Skipped, |n| {
                        n.cancelled = true;
                        n.reason = Some("cancelled".to_string());
                    }) {
                        self.persist(run_id, &id, state).await;
                    }
                }
                return;
            }
            Err(e) => (e.id(), Err(NodeError::Panicked)),
        };

        let Some(id) = running.remove(&task_id) else {
            warn!(run_id = %run_id, "Finished task does not belong to any node");
            return;
        };
        let Some(node) = manifest.node(&id) else {
            return;
        };

        let transition = match outcome.and_then(|outputs| check_outputs(node, outputs)) {
            Ok(values) => {
                for output in &node.outputs {
                    if let Some(value) = values.get(&output.name) {
                        if !artifacts.insert(output.artifact.clone(), value.clone()) {
                            warn!(
                                run_id = %run_id,
                                node_id = %id,
                                artifact = %output.artifact,
                                "Artifact already exists, keeping the first value"
                            );
                        }
                    }
                }
                info!(run_id = %run_id, node_id = %id, "Node succeeded");
                table.transition(&id, NodeStatus::Running, NodeStatus::Succeeded, |n| n.outputs = values)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(run_id = %run_id, node_id = %id, reason = %reason, "Node failed");
                table.transition(&id, NodeStatus::Running, NodeStatus::Failed, |n| n.reason = Some(reason))
            }
        };
        if let Some(state) = transition {
            self.persist(run_id, &id, state).await;
        }
    }

    /// Mark every node that has not started as cancelled
    async fn skip_unstarted(&self, order: &[String], table: &NodeTable, run_id: &str) {
        for id in order {
            for from in [NodeStatus::Pending, NodeStatus::Ready] {
                let skipped = table.transition(id, from, NodeStatus::Skipped, |n| {
                    n.cancelled = true;
                    n.reason = Some("cancelled".to_string());
                });
                if let Some(state) = skipped {
                    self.persist(run_id, id, state).await;
                }
            }
        }
    }

    /// Write a node state through to the tracker
    async fn persist(&self, run_id: &str, node_id: &str, state: NodeState) {
        if let Err(e) = self.tracker.update_node_status(run_id, node_id, state).await {
            warn!(run_id = %run_id, node_id = %node_id, error = %e, "Failed to record node state");
        }
    }
}

/// Initial artifact store holding the run's parameters
fn seed_artifacts(manifest: &Manifest, run: &Run) -> ArtifactStore {
    let mut store = ArtifactStore::new();
    for spec in &manifest.parameters {
        if let Some(value) = run.params.get(&spec.name) {
            if let Ok(value) = spec.data_type.coerce(Value::Param(value.clone())) {
                store.insert(ArtifactId::param(&spec.name), value);
            }
        }
    }
    store
}

fn gate_artifact(gate: &GateRef) -> ArtifactId {
    match gate {
        GateRef::Param { param } => ArtifactId::param(param),
        GateRef::Output { task, output } => ArtifactId::output(task, output),
    }
}

/// Whether every clause of a node's condition holds
fn evaluate_condition(node: &ManifestNode, artifacts: &ArtifactStore) -> Result<bool, NodeError> {
    for clause in &node.condition.all {
        let value = artifacts
            .get(&gate_artifact(&clause.gate))
            .and_then(Value::as_param)
            .ok_or_else(|| NodeError::UnresolvedCondition {
                gate: clause.gate.to_string(),
            })?;
        if !value.loosely_equals(&clause.equals) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn resolve_inputs(node: &ManifestNode, artifacts: &ArtifactStore) -> Result<BTreeMap<String, Value>, NodeError> {
    let mut inputs = BTreeMap::new();
    for input in &node.inputs {
        let value = match &input.binding {
            Some(Binding::Param { param }) => artifacts.get(&ArtifactId::param(param)).cloned(),
            Some(Binding::Output { task, output }) => artifacts.get(&ArtifactId::output(task, output)).cloned(),
            Some(Binding::Literal(value)) => Some(Value::Param(value.clone())),
            None => input.default.clone().map(Value::Param),
        }
        .ok_or_else(|| NodeError::UnresolvedInput {
            input: input.name.clone(),
        })?;

        let value = input
            .data_type
            .coerce(value)
            .map_err(|actual| NodeError::InputType {
                input: input.name.clone(),
                expected: input.data_type,
                actual,
            })?;
        inputs.insert(input.name.clone(), value);
    }
    Ok(inputs)
}

/// Validate a body's outputs against the node's declared outputs
fn check_outputs(node: &ManifestNode, outputs: TaskOutputs) -> Result<BTreeMap<String, Value>, NodeError> {
    let mut produced = outputs.into_inner();
    let mut checked = BTreeMap::new();
    for output in &node.outputs {
        let value = produced.remove(&output.name).ok_or_else(|| NodeError::MissingOutput {
            output: output.name.clone(),
        })?;
        let value = output
            .data_type
            .coerce(value)
            .map_err(|actual| NodeError::OutputType {
                output: output.name.clone(),
                expected: output.data_type,
                actual,
            })?;
        checked.insert(output.name.clone(), value);
    }
    if !produced.is_empty() {
        let extra: Vec<&String> = produced.keys().collect();
        warn!(node_id = %node.id, extra = ?extra, "Ignoring undeclared outputs");
    }
    Ok(checked)
}
