// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Execution properties of the scheduler and the orchestrator

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagflow::cache::{ManifestStore, MemoryManifestStore};
use dagflow::pipeline::Binding;
use dagflow::{
    body_fn, compile, BodyRef, BodyRegistry, DagflowError, DataType, InMemoryTracker, LocalSubstrate, Manifest,
    NodeStatus, Orchestrator, ParamValue, PipelineBuilder, RunStatus, RunTracker, Scheduler, SchedulerConfig,
    TaskBody, TaskContext, TaskDefinition, TaskOutputs, Value,
};
use tempfile::TempDir;
use tokio::sync::Notify;

type EventLog = Arc<Mutex<Vec<String>>>;

fn source() -> TaskDefinition {
    TaskDefinition::new("source", BodyRef::registered("step")).output("out", DataType::Int)
}

fn step() -> TaskDefinition {
    TaskDefinition::new("step", BodyRef::registered("step"))
        .input("x", DataType::Int)
        .output("out", DataType::Int)
}

fn join() -> TaskDefinition {
    TaskDefinition::new("join", BodyRef::registered("step"))
        .input("a", DataType::Int)
        .input("b", DataType::Int)
        .output("out", DataType::Int)
}

fn scheduler(bodies: BodyRegistry, temp: &TempDir, workers: usize) -> Scheduler {
    Scheduler::new(
        bodies,
        Arc::new(LocalSubstrate::new(temp.path())),
        Arc::new(InMemoryTracker::new()),
        SchedulerConfig::default()
            .with_max_workers(workers)
            .with_cancel_grace(Duration::from_millis(100)),
    )
}

/// Sums its integer inputs plus one, logging start and end
async fn summing(ctx: TaskContext, log: EventLog) -> anyhow::Result<TaskOutputs> {
    log.lock().unwrap().push(format!("start:{}", ctx.node_id));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut total = 1.0;
    for name in ctx.inputs.keys() {
        total += ctx.f64(name)?;
    }
    log.lock().unwrap().push(format!("end:{}", ctx.node_id));
    Ok(TaskOutputs::new().with("out", total as i64))
}

fn summing_body(log: &EventLog) -> Arc<dyn TaskBody> {
    let log = log.clone();
    body_fn(move |ctx| summing(ctx, log.clone()))
}

fn diamond() -> Manifest {
    let mut builder = PipelineBuilder::new("diamond");
    let a = builder.define_task("a", &source(), []);
    let b = builder.define_task("b", &step(), [("x", a.output("out").into())]);
    let c = builder.define_task("c", &step(), [("x", a.output("out").into())]);
    builder.define_task("d", &join(), [("a", b.output("out").into()), ("b", c.output("out").into())]);
    compile(&builder.seal().unwrap()).unwrap()
}

fn position(log: &[String], event: &str) -> usize {
    log.iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("missing event {}", event))
}

#[tokio::test]
async fn test_nodes_run_once_after_their_dependencies() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let bodies = BodyRegistry::new().with("step", summing_body(&log));
    let manifest = diamond();

    let run = scheduler(bodies, &temp, 4)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.count(NodeStatus::Succeeded), 4);
    // a = 1, b = c = 2, d = 2 + 2 + 1
    assert_eq!(run.node("d").unwrap().outputs["out"], Value::from(5));

    let log = log.lock().unwrap().clone();
    for id in ["a", "b", "c", "d"] {
        let starts = log.iter().filter(|e| **e == format!("start:{}", id)).count();
        assert_eq!(starts, 1, "node {} started {} times", id, starts);
    }
    for (from, to) in manifest.edges.iter().map(|e| (e.from.as_str(), e.to.as_str())) {
        assert!(
            position(&log, &format!("end:{}", from)) < position(&log, &format!("start:{}", to)),
            "{} started before {} finished: {:?}",
            to,
            from,
            log
        );
    }
}

#[tokio::test]
async fn test_failure_skips_downstream_only() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let broken = TaskDefinition::new("broken", BodyRef::registered("fail")).output("out", DataType::Int);

    let mut builder = PipelineBuilder::new("isolation");
    let a = builder.define_task("a", &broken, []);
    let b = builder.define_task("b", &step(), [("x", a.output("out").into())]);
    builder.define_task("c", &step(), [("x", b.output("out").into())]);
    builder.define_task("independent", &source(), []);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let bodies = BodyRegistry::new()
        .with("step", summing_body(&log))
        .with("fail", body_fn(|_| async { Err(anyhow::anyhow!("disk full")) }));
    let run = scheduler(bodies, &temp, 2)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.node_status("a"), Some(NodeStatus::Failed));
    assert!(run.node("a").unwrap().reason.as_deref().unwrap().contains("disk full"));
    assert_eq!(run.node_status("b"), Some(NodeStatus::Skipped));
    assert_eq!(
        run.node("b").unwrap().reason.as_deref(),
        Some("upstream node 'a' failed")
    );
    assert_eq!(run.node_status("c"), Some(NodeStatus::Skipped));
    assert_eq!(
        run.node("c").unwrap().reason.as_deref(),
        Some("upstream node 'b' was skipped")
    );
    assert_eq!(run.node_status("independent"), Some(NodeStatus::Succeeded));

    let log = log.lock().unwrap();
    assert!(!log.iter().any(|e| e == "start:b" || e == "start:c"));
}

#[tokio::test]
async fn test_sibling_failure_does_not_stop_branch() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let broken = TaskDefinition::new("broken", BodyRef::registered("fail"))
        .input("x", DataType::Int)
        .output("out", DataType::Int);

    let mut builder = PipelineBuilder::new("siblings");
    let a = builder.define_task("a", &source(), []);
    builder.define_task("b", &broken, [("x", a.output("out").into())]);
    builder.define_task("c", &step(), [("x", a.output("out").into())]);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let bodies = BodyRegistry::new()
        .with("step", summing_body(&log))
        .with("fail", body_fn(|_| async { Err(anyhow::anyhow!("bad batch")) }));
    let run = scheduler(bodies, &temp, 2)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.node_status("a"), Some(NodeStatus::Succeeded));
    assert_eq!(run.node_status("b"), Some(NodeStatus::Failed));
    assert_eq!(run.node_status("c"), Some(NodeStatus::Succeeded));
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_false_gate_skips_whole_chain() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PipelineBuilder::new("chain");
    let enabled = builder.param("enabled", DataType::Bool, Some(false.into()));
    let a = {
        let mut scope = builder.begin_condition(enabled, true);
        scope.define_task("a", &source(), [])
    };
    let b = builder.define_task("b", &step(), [("x", a.output("out").into())]);
    builder.define_task("c", &step(), [("x", b.output("out").into())]);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let run = scheduler(BodyRegistry::new().with("step", summing_body(&log)), &temp, 2)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.count(NodeStatus::Skipped), 3);
    assert_eq!(
        run.node("a").unwrap().reason.as_deref(),
        Some("condition not met: params.enabled == true")
    );
    assert_eq!(run.node("b").unwrap().reason.as_deref(), Some("upstream node 'a' was skipped"));
    assert_eq!(run.node("c").unwrap().reason.as_deref(), Some("upstream node 'b' was skipped"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_false_inner_scope_skips_only_inner_nodes() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PipelineBuilder::new("nested");
    let outer_flag = builder.param("outer", DataType::Bool, Some(true.into()));
    let inner_flag = builder.param("inner", DataType::Bool, Some(false.into()));
    {
        let mut outer = builder.begin_condition(outer_flag, true);
        let a = outer.define_task("a", &source(), []);
        {
            let mut inner = outer.begin_condition(inner_flag, true);
            let b = inner.define_task("b", &step(), [("x", a.output("out").into())]);
            inner.define_task("b2", &step(), [("x", b.output("out").into())]);
        }
        outer.define_task("c", &step(), [("x", a.output("out").into())]);
    }
    builder.define_task("d", &source(), []);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let run = scheduler(BodyRegistry::new().with("step", summing_body(&log)), &temp, 2)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    for id in ["a", "c", "d"] {
        assert_eq!(run.node_status(id), Some(NodeStatus::Succeeded), "node {}", id);
    }
    for id in ["b", "b2"] {
        let node = run.node(id).unwrap();
        assert_eq!(node.status, NodeStatus::Skipped, "node {}", id);
        assert!(!node.cancelled, "node {}", id);
    }
    assert_eq!(
        run.node("b").unwrap().reason.as_deref(),
        Some("condition not met: params.outer == true && params.inner == true")
    );

    let log = log.lock().unwrap().clone();
    assert!(!log.iter().any(|e| e.ends_with(":b") || e.ends_with(":b2")), "{:?}", log);
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let temp = TempDir::new().unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut builder = PipelineBuilder::new("wide");
    for _ in 0..6 {
        builder.define_task("leaf", &source(), []);
    }
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let (c, p) = (current.clone(), peak.clone());
    let bodies = BodyRegistry::new().with(
        "step",
        body_fn(move |_| {
            let (current, peak) = (c.clone(), p.clone());
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(TaskOutputs::new().with("out", 1))
            }
        }),
    );

    let run = scheduler(bodies, &temp, 2)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(run.count(NodeStatus::Succeeded), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_parameter_gate() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PipelineBuilder::new("gated");
    let env = builder.param("env", DataType::String, Some("dev".into()));
    let a = builder.define_task("a", &source(), []);
    {
        let mut prod = builder.begin_condition(env, "prod");
        prod.define_task("publish", &step(), [("x", a.output("out").into())]);
    }
    let manifest = compile(&builder.seal().unwrap()).unwrap();
    let sched = scheduler(BodyRegistry::new().with("step", summing_body(&log)), &temp, 2);

    let run = sched.execute(&manifest, BTreeMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.node_status("publish"), Some(NodeStatus::Skipped));
    assert_eq!(
        run.node("publish").unwrap().reason.as_deref(),
        Some("condition not met: params.env == \"prod\"")
    );

    let mut params = BTreeMap::new();
    params.insert("env".to_string(), ParamValue::from("prod"));
    let run = sched.execute(&manifest, params).await.unwrap();
    assert_eq!(run.node_status("publish"), Some(NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_literal_and_default_inputs() {
    let temp = TempDir::new().unwrap();
    let def = TaskDefinition::new("scale", BodyRef::registered("scale"))
        .input("factor", DataType::Float)
        .input_with_default("offset", DataType::Float, 0.5)
        .output("out", DataType::Float);

    let mut builder = PipelineBuilder::new("literals");
    builder.define_task("scale", &def, [("factor", Binding::Literal(ParamValue::Int(4)))]);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let bodies = BodyRegistry::new().with(
        "scale",
        body_fn(|ctx| async move {
            let factor = ctx.f64("factor")?;
            let offset = ctx.f64("offset")?;
            Ok(TaskOutputs::new().with("out", factor + offset))
        }),
    );
    let run = scheduler(bodies, &temp, 1)
        .execute(&manifest, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(run.node("scale").unwrap().outputs["out"], Value::from(4.5));
}

fn orchestrator(bodies: BodyRegistry, temp: &TempDir) -> Orchestrator {
    Orchestrator::new(scheduler(bodies, temp, 2), Arc::new(MemoryManifestStore::new()))
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let orch = orchestrator(BodyRegistry::new().with("step", summing_body(&log)), &temp);
    let manifest = diamond();

    let first = orch
        .submit(manifest.clone(), "exp", "nightly", BTreeMap::new())
        .await
        .unwrap();
    let second = orch
        .submit(manifest.clone(), "exp", "nightly", BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(first, second);

    let run = orch.wait(&first).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);

    let other = orch
        .submit(manifest.clone(), "exp", "weekly", BTreeMap::new())
        .await
        .unwrap();
    assert_ne!(first, other);
    orch.wait(&other).await.unwrap();

    let experiment = orch.tracker().get_experiment("exp").await.unwrap().unwrap();
    let runs = orch.tracker().list_runs(Some(&experiment.id)).await.unwrap();
    assert_eq!(runs.len(), 2);

    // Each node ran once per distinct run
    let starts = log.lock().unwrap().iter().filter(|e| *e == "start:a").count();
    assert_eq!(starts, 2);
}

#[tokio::test]
async fn test_submit_by_reference() {
    let temp = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let orch = orchestrator(BodyRegistry::new().with("step", summing_body(&log)), &temp);
    let manifest = diamond();
    let digest = orch.manifests().store(&manifest).await.unwrap();

    let run_id = orch
        .submit(dagflow::ManifestSource::Ref(digest.clone()), "exp", "by-ref", BTreeMap::new())
        .await
        .unwrap();
    let run = orch.wait(&run_id).await.unwrap();
    assert_eq!(run.manifest_ref, digest);
    assert_eq!(run.status, RunStatus::Succeeded);

    let missing = orch
        .submit(dagflow::ManifestSource::Ref("nope".into()), "exp", "by-ref", BTreeMap::new())
        .await;
    assert!(matches!(missing, Err(DagflowError::ManifestNotFound { .. })));
}

#[tokio::test]
async fn test_cancel_skips_unfinished_nodes() {
    let temp = TempDir::new().unwrap();
    let slow = TaskDefinition::new("slow", BodyRef::registered("slow")).output("out", DataType::Int);
    let mut builder = PipelineBuilder::new("cancellable");
    let a = builder.define_task("a", &slow, []);
    builder.define_task("b", &step(), [("x", a.output("out").into())]);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let bodies = BodyRegistry::new().with("step", summing_body(&log)).with(
        "slow",
        body_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TaskOutputs::new().with("out", 1))
        }),
    );
    let orch = orchestrator(bodies, &temp);
    let run_id = orch
        .submit(manifest, "exp", "cancel-me", BTreeMap::new())
        .await
        .unwrap();

    let mut statuses = HashMap::new();
    for _ in 0..200 {
        statuses = orch.get_status(&run_id).await.unwrap().nodes.into_iter().collect();
        if statuses.get("a") == Some(&NodeStatus::Running) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(statuses.get("a"), Some(&NodeStatus::Running));

    assert!(orch.cancel(&run_id).await.unwrap());
    let run = tokio::time::timeout(Duration::from_secs(10), orch.wait(&run_id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    for id in ["a", "b"] {
        let node = run.node(id).unwrap();
        assert_eq!(node.status, NodeStatus::Skipped, "node {}", id);
        assert!(node.cancelled, "node {}", id);
    }
    assert!(log.lock().unwrap().is_empty());

    // Nothing left to cancel
    assert!(!orch.cancel(&run_id).await.unwrap());
    assert!(matches!(
        orch.cancel("no-such-run").await,
        Err(DagflowError::RunNotFound { .. })
    ));
}

#[tokio::test]
async fn test_node_finishing_within_grace_keeps_its_result() {
    let temp = TempDir::new().unwrap();
    let gated = TaskDefinition::new("gated", BodyRef::registered("gated")).output("out", DataType::Int);
    let mut builder = PipelineBuilder::new("graceful");
    let a = builder.define_task("a", &gated, []);
    builder.define_task("b", &step(), [("x", a.output("out").into())]);
    let manifest = compile(&builder.seal().unwrap()).unwrap();

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let bodies = BodyRegistry::new().with("step", summing_body(&log)).with("gated", {
        let (started, release) = (started.clone(), release.clone());
        body_fn(move |_| {
            let (started, release) = (started.clone(), release.clone());
            async move {
                started.notify_one();
                release.notified().await;
                Ok(TaskOutputs::new().with("out", 7))
            }
        })
    });
    let scheduler = Scheduler::new(
        bodies,
        Arc::new(LocalSubstrate::new(temp.path())),
        Arc::new(InMemoryTracker::new()),
        SchedulerConfig::default()
            .with_max_workers(2)
            .with_cancel_grace(Duration::from_secs(30)),
    );
    let orch = Orchestrator::new(scheduler, Arc::new(MemoryManifestStore::new()));
    let run_id = orch
        .submit(manifest, "exp", "graceful", BTreeMap::new())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .unwrap();
    assert!(orch.cancel(&run_id).await.unwrap());
    release.notify_one();

    let run = tokio::time::timeout(Duration::from_secs(5), orch.wait(&run_id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    let a = run.node("a").unwrap();
    assert_eq!(a.status, NodeStatus::Succeeded);
    assert!(!a.cancelled);
    assert_eq!(a.outputs["out"], Value::from(7));

    let b = run.node("b").unwrap();
    assert_eq!(b.status, NodeStatus::Skipped);
    assert!(b.cancelled);
    assert!(log.lock().unwrap().is_empty());
}
