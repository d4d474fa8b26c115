// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! preprocess -> train -> validate -> deploy, with deploy gated on validation

use std::collections::BTreeMap;
use std::sync::Arc;

use dagflow::artifact::ArtifactPayload;
use dagflow::cache::MemoryManifestStore;
use dagflow::{
    body_fn, compile, BodyRef, BodyRegistry, DataType, FilesystemTracker, LocalSubstrate, Manifest, NodeStatus,
    Orchestrator, ParamValue, PipelineBuilder, RunStatus, RunTracker, Scheduler, SchedulerConfig, TaskContext,
    TaskDefinition, TaskOutputs, Value,
};
use tempfile::TempDir;

fn ml_manifest() -> Manifest {
    let preprocess = TaskDefinition::new("preprocess_data", BodyRef::registered("preprocess"))
        .input("test_size", DataType::Float)
        .output("processed_data", DataType::Dataset);
    let train = TaskDefinition::new("train_model", BodyRef::registered("train"))
        .input("data", DataType::Dataset)
        .output("model", DataType::Model)
        .output("metrics", DataType::Metrics);
    let validate = TaskDefinition::new("validate_model", BodyRef::registered("validate"))
        .input("metrics", DataType::Metrics)
        .input_with_default("accuracy_threshold", DataType::Float, 0.8)
        .output("output", DataType::Bool);
    let deploy = TaskDefinition::new("deploy_model", BodyRef::registered("deploy"))
        .input("model", DataType::Model)
        .output("endpoint", DataType::String);

    let mut builder = PipelineBuilder::new("ml-pipeline").description("Train and conditionally deploy");
    let test_size = builder.param("test_size", DataType::Float, Some(0.2.into()));
    let threshold = builder.param("accuracy_threshold", DataType::Float, Some(0.8.into()));

    let pre = builder.task("preprocess", &preprocess).bind("test_size", test_size).add();
    let trained = builder.task("train", &train).bind("data", pre.output("processed_data")).add();
    let validated = builder
        .task("validate", &validate)
        .bind("metrics", trained.output("metrics"))
        .bind("accuracy_threshold", threshold)
        .add();
    {
        let mut passed = builder.begin_condition(validated.output("output"), true);
        passed.task("deploy", &deploy).bind("model", trained.output("model")).add();
    }

    compile(&builder.seal().unwrap()).unwrap()
}

async fn preprocess(ctx: TaskContext) -> anyhow::Result<TaskOutputs> {
    let test_size = ctx.f64("test_size")?;
    anyhow::ensure!(test_size > 0.0 && test_size < 1.0, "test_size out of range");
    let uri = ctx.output_uri("processed_data")?.to_string();
    Ok(TaskOutputs::new().with("processed_data", ArtifactPayload::new(uri).with_metadata("rows", 800)))
}

async fn train(ctx: TaskContext, accuracy: f64) -> anyhow::Result<TaskOutputs> {
    let data = ctx.artifact("data")?;
    anyhow::ensure!(data.uri.starts_with("file://"), "unexpected data uri {}", data.uri);
    let model = ctx.output_uri("model")?.to_string();
    let metrics = ArtifactPayload::new(ctx.output_uri("metrics")?).with_metadata("accuracy", accuracy);
    Ok(TaskOutputs::new()
        .with("model", ArtifactPayload::new(model))
        .with("metrics", metrics))
}

async fn validate(ctx: TaskContext) -> anyhow::Result<TaskOutputs> {
    let accuracy = ctx
        .artifact("metrics")?
        .metadata
        .get("accuracy")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow::anyhow!("metrics carry no accuracy"))?;
    let threshold = ctx.f64("accuracy_threshold")?;
    Ok(TaskOutputs::new().with("output", accuracy >= threshold))
}

async fn deploy(ctx: TaskContext) -> anyhow::Result<TaskOutputs> {
    let model = ctx.artifact("model")?;
    anyhow::ensure!(model.uri.starts_with("file://"), "model has no local location");
    Ok(TaskOutputs::new().with("endpoint", format!("https://models.local/{}", ctx.run_id)))
}

fn bodies(accuracy: f64) -> BodyRegistry {
    BodyRegistry::new()
        .with("preprocess", body_fn(preprocess))
        .with("train", body_fn(move |ctx| train(ctx, accuracy)))
        .with("validate", body_fn(validate))
        .with("deploy", body_fn(deploy))
}

fn orchestrator(accuracy: f64, temp: &TempDir) -> Orchestrator {
    let scheduler = Scheduler::new(
        bodies(accuracy),
        Arc::new(LocalSubstrate::new(temp.path().join("artifacts"))),
        Arc::new(FilesystemTracker::new(temp.path().join("tracker")).unwrap()),
        SchedulerConfig::default().with_max_workers(2),
    );
    Orchestrator::new(scheduler, Arc::new(MemoryManifestStore::new()))
}

fn params() -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    params.insert("test_size".to_string(), ParamValue::Float(0.2));
    params.insert("accuracy_threshold".to_string(), ParamValue::Float(0.8));
    params
}

#[tokio::test]
async fn test_accurate_model_is_deployed() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(0.85, &temp);

    let run_id = orch
        .submit(ml_manifest(), "ml-experiments", "nightly", params())
        .await
        .unwrap();
    let run = orch.wait(&run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.count(NodeStatus::Succeeded), 4);
    assert_eq!(run.node("validate").unwrap().outputs["output"], Value::from(true));
    let endpoint = run.node("deploy").unwrap().outputs["endpoint"].as_str().unwrap().to_string();
    assert!(endpoint.ends_with(&run_id));

    let summary = orch.get_status(&run_id).await.unwrap();
    assert_eq!(summary.status, RunStatus::Succeeded);
    assert!(summary.nodes.values().all(|s| *s == NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_inaccurate_model_skips_deploy() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(0.5, &temp);

    let run_id = orch
        .submit(ml_manifest(), "ml-experiments", "nightly", params())
        .await
        .unwrap();
    let run = orch.wait(&run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.count(NodeStatus::Succeeded), 3);
    assert_eq!(run.count(NodeStatus::Skipped), 1);
    assert_eq!(run.node("validate").unwrap().outputs["output"], Value::from(false));

    let deploy = run.node("deploy").unwrap();
    assert_eq!(deploy.status, NodeStatus::Skipped);
    assert!(!deploy.cancelled);
    assert_eq!(deploy.reason.as_deref(), Some("condition not met: validate.output == true"));
}

#[tokio::test]
async fn test_run_is_persisted_with_its_experiment() {
    let temp = TempDir::new().unwrap();
    let run_id = {
        let orch = orchestrator(0.85, &temp);
        let run_id = orch
            .submit(ml_manifest(), "ml-experiments", "nightly", params())
            .await
            .unwrap();
        orch.wait(&run_id).await.unwrap();
        run_id
    };

    let tracker = FilesystemTracker::new(temp.path().join("tracker")).unwrap();
    let experiment = tracker.get_experiment("ml-experiments").await.unwrap().unwrap();
    let run = tracker.get_run(&run_id).await.unwrap();
    assert_eq!(run.experiment_id, experiment.id);
    assert_eq!(run.pipeline_name, "ml-pipeline");
    assert_eq!(run.params["accuracy_threshold"], ParamValue::Float(0.8));
    assert!(run.finished_at.is_some());
    for node in run.nodes.values() {
        assert!(node.started_at.is_some() && node.finished_at.is_some());
    }

    let artifacts = temp.path().join("artifacts").join(&run_id);
    assert!(artifacts.join("train").is_dir());
}

#[tokio::test]
async fn test_defaults_fill_missing_parameters() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(0.85, &temp);
    let run_id = orch
        .submit(ml_manifest(), "ml-experiments", "defaults", BTreeMap::new())
        .await
        .unwrap();
    let run = orch.wait(&run_id).await.unwrap();
    assert_eq!(run.params["test_size"], ParamValue::Float(0.2));
    assert_eq!(run.status, RunStatus::Succeeded);
}
