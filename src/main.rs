// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! dagflow - Declarative Workflow Orchestrator
//!
//! Compile typed task pipelines into manifests and run them.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dagflow::cli::{run::RunOptions, Cli, Commands, Context};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dagflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let ctx = Context::from_cli(&cli)?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Compile {
            pipeline,
            output,
            format,
            store,
        } => dagflow::cli::compile::run(&ctx, pipeline, output, format, store).await,
        Commands::Validate { pipeline } => dagflow::cli::validate::run(&ctx, pipeline).await,
        Commands::Graph {
            pipeline,
            manifest,
            format,
        } => dagflow::cli::graph::run(pipeline, manifest, format).await,
        Commands::Run {
            pipeline,
            manifest,
            reference,
            experiment,
            experiment_description,
            run_name,
            params,
        } => {
            let options = RunOptions {
                pipeline,
                manifest,
                reference,
                experiment,
                experiment_description,
                run_name,
                params,
            };
            dagflow::cli::run::run(&ctx, options).await
        }
        Commands::Status { run_id, format } => dagflow::cli::status::run(&ctx, run_id, format).await,
        Commands::Runs { experiment } => dagflow::cli::runs::run(&ctx, experiment).await,
        Commands::Manifests { action } => dagflow::cli::manifests::run(&ctx, action).await,
    }
}
