// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Runs command - list recorded runs

use colored::Colorize;
use miette::Result;
use std::collections::HashMap;

use super::Context;
use crate::tracker::{NodeStatus, RunTracker};
use crate::utils::{print_header, run_status};

/// Run the runs command
pub async fn run(ctx: &Context, experiment: Option<String>) -> Result<()> {
    let tracker = ctx.tracker()?;

    let experiment_id = match &experiment {
        Some(name) => match tracker.get_experiment(name).await? {
            Some(found) => Some(found.id),
            None => {
                println!("{}", format!("No experiment named '{}'.", name).dimmed());
                return Ok(());
            }
        },
        None => None,
    };

    let names: HashMap<String, String> = tracker
        .list_experiments()
        .await?
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect();
    let runs = tracker.list_runs(experiment_id.as_deref()).await?;

    print_header("Runs");
    if runs.is_empty() {
        println!("{}", "  No runs recorded.".dimmed());
        return Ok(());
    }

    for run in &runs {
        let experiment = names.get(&run.experiment_id).map(String::as_str).unwrap_or("?");
        println!(
            "  {}  {:<10} {} [{}] {}/{} succeeded  {}",
            run.run_id.dimmed(),
            run_status(run.status),
            run.run_name,
            experiment,
            run.count(NodeStatus::Succeeded),
            run.nodes.len(),
            run.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }

    Ok(())
}
