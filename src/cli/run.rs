// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Run command - submit a run and follow it to completion

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{load_manifest, Context};
use crate::artifact::ParamValue;
use crate::cache::ManifestStore;
use crate::client::ManifestSource;
use crate::tracker::Run;
use crate::utils::{create_progress_bar, create_spinner, node_status, print_header, run_progress_message, run_status};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Options of the run command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pipeline: PathBuf,
    pub manifest: Option<PathBuf>,
    pub reference: Option<String>,
    pub experiment: String,
    pub experiment_description: Option<String>,
    pub run_name: Option<String>,
    pub params: Vec<String>,
}

/// Run the run command
pub async fn run(ctx: &Context, options: RunOptions) -> Result<()> {
    let params = parse_params(&options.params)?;
    let orchestrator = ctx.orchestrator()?;

    let (source, pipeline_name) = match options.reference {
        Some(reference) => {
            let manifest = orchestrator.manifests().fetch(&reference).await?;
            (ManifestSource::Ref(reference), manifest.name().to_string())
        }
        None => {
            let manifest = load_manifest(&options.pipeline, options.manifest.as_deref())?;
            let name = manifest.name().to_string();
            (ManifestSource::Inline(manifest), name)
        }
    };
    let run_name = options.run_name.unwrap_or_else(|| format!("{}-run", pipeline_name));

    if let Some(description) = options.experiment_description.as_deref() {
        orchestrator
            .create_experiment(&options.experiment, Some(description))
            .await?;
    }

    let spinner = create_spinner("Submitting run...");
    let submitted = orchestrator
        .submit(source, &options.experiment, &run_name, params)
        .await;
    spinner.finish_and_clear();
    let run_id = submitted?;
    println!("{} Submitted run {}", "✓".green(), run_id.cyan());

    let snapshot = orchestrator.get_run(&run_id).await?;
    let pb = create_progress_bar(snapshot.nodes.len() as u64, &run_name);
    let finished = loop {
        tokio::select! {
            done = orchestrator.wait(&run_id) => break done?,
            _ = tokio::signal::ctrl_c() => {
                pb.println(format!("{} Cancelling run {}", "⚠".yellow(), run_id));
                orchestrator.cancel(&run_id).await?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let current = orchestrator.get_run(&run_id).await?;
                pb.set_position(current.finished_nodes() as u64);
                pb.set_message(run_progress_message(&current));
            }
        }
    };
    pb.finish_and_clear();

    print_run(&finished, ctx.verbose);
    Ok(())
}

/// Print a run with its node states
pub fn print_run(run: &Run, verbose: bool) {
    println!();
    print_header(&format!("Run {} ({})", run.run_name, run.run_id));
    println!("  Pipeline: {}", run.pipeline_name);
    println!("  Status:   {}", run_status(run.status));
    if verbose {
        println!("  Manifest: {}", run.manifest_ref.dimmed());
        for (name, value) in &run.params {
            println!("  Param:    {} = {}", name, value);
        }
    }
    println!();
    for (id, node) in &run.nodes {
        let (marker, label) = node_status(node.status);
        let reason = node
            .reason
            .as_deref()
            .map(|r| format!(" - {}", r))
            .unwrap_or_default();
        println!("  {} {} {}{}", marker, id, label, reason.dimmed());
        if verbose {
            for (output, value) in &node.outputs {
                println!("      {} = {}", output, value.to_string().dimmed());
            }
        }
    }
}

/// Parse repeated `key=value` parameters
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, ParamValue>> {
    let mut params = BTreeMap::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| miette::miette!("Invalid parameter '{}': expected KEY=VALUE", item))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(miette::miette!("Invalid parameter '{}': empty key", item));
        }
        params.insert(key.to_string(), ParamValue::parse_lenient(value));
    }
    Ok(params)
}
