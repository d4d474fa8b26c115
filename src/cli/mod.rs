// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for dagflow.

pub mod compile;
pub mod graph;
pub mod manifests;
pub mod run;
pub mod runs;
pub mod status;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::FilesystemManifestStore;
use crate::client::Orchestrator;
use crate::compiler::{compile as compile_pipeline, Manifest};
use crate::config::DagflowConfig;
use crate::executors::{BodyRegistry, LocalSubstrate};
use crate::pipeline::PipelineFile;
use crate::scheduler::Scheduler;
use crate::tracker::FilesystemTracker;

/// Declarative workflow orchestrator
///
/// Compile typed task pipelines into manifests and run them.
#[derive(Parser, Debug)]
#[clap(
    name = "dagflow",
    version,
    about = "Declarative workflow orchestrator for typed task DAGs",
    long_about = None,
    after_help = "Examples:\n\
        dagflow validate pipeline.yaml          Check a pipeline file\n\
        dagflow compile -o manifest.json        Compile pipeline.yaml to a manifest\n\
        dagflow run -p accuracy_threshold=0.8   Run pipeline.yaml and wait for it\n\
        dagflow runs                            List recorded runs\n\n\
        See 'dagflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: ./dagflow.toml, then the user config dir)
    #[clap(long, global = true, env = "DAGFLOW_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// State directory for runs and stored manifests
    #[clap(long, global = true, env = "DAGFLOW_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Maximum number of tasks running at once
    #[clap(long, global = true, env = "DAGFLOW_WORKERS")]
    pub workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a pipeline file into a manifest
    Compile {
        /// Pipeline file
        #[clap(default_value = "pipeline.yaml")]
        pipeline: PathBuf,

        /// Write the manifest here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Manifest format
        #[clap(short, long, value_enum, default_value = "json")]
        format: ManifestFormat,

        /// Also put the manifest in the manifest store
        #[clap(long)]
        store: bool,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = "pipeline.yaml")]
        pipeline: PathBuf,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = "pipeline.yaml")]
        pipeline: PathBuf,

        /// Read a compiled manifest instead of a pipeline file
        #[clap(short, long, conflicts_with = "pipeline")]
        manifest: Option<PathBuf>,

        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: GraphFormat,
    },

    /// Submit a run and wait for it to finish
    Run {
        /// Pipeline file
        #[clap(default_value = "pipeline.yaml")]
        pipeline: PathBuf,

        /// Run a compiled manifest file
        #[clap(short, long, conflicts_with = "reference")]
        manifest: Option<PathBuf>,

        /// Run a stored manifest by digest
        #[clap(long = "ref", value_name = "DIGEST")]
        reference: Option<String>,

        /// Experiment the run belongs to
        #[clap(short, long, default_value = "Default")]
        experiment: String,

        /// Description used if the experiment is created
        #[clap(long)]
        experiment_description: Option<String>,

        /// Run name (default: <pipeline>-run)
        #[clap(short = 'n', long)]
        run_name: Option<String>,

        /// Pipeline parameter, repeatable
        #[clap(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Show the status of a run
    Status {
        /// Run id
        run_id: String,

        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List recorded runs
    Runs {
        /// Only runs of this experiment
        #[clap(short, long)]
        experiment: Option<String>,
    },

    /// Manifest store management
    Manifests {
        #[clap(subcommand)]
        action: ManifestAction,
    },
}

/// Manifest store actions
#[derive(Subcommand, Debug, Clone)]
pub enum ManifestAction {
    /// Show store statistics
    Stats,

    /// Clear the store
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// List stored manifests
    List,
}

/// Output format for status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Manifest serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ManifestFormat {
    Json,
    Yaml,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub config: DagflowConfig,
    pub verbose: bool,
}

impl Context {
    /// Resolve configuration from the file, flags and environment
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = DagflowConfig::load(cli.config.as_deref())?.with_overrides(cli.state_dir.clone(), cli.workers);
        Ok(Self {
            config,
            verbose: cli.verbose,
        })
    }

    pub fn manifest_store(&self) -> Result<FilesystemManifestStore> {
        Ok(FilesystemManifestStore::in_state_dir(&self.config.state_dir())?)
    }

    pub fn tracker(&self) -> Result<FilesystemTracker> {
        Ok(FilesystemTracker::new(self.config.state_dir().join("tracker"))?)
    }

    /// Orchestrator running shell bodies locally with on-disk state
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let scheduler = Scheduler::new(
            BodyRegistry::new(),
            Arc::new(LocalSubstrate::new(self.config.artifact_root())),
            Arc::new(self.tracker()?),
            self.config.scheduler_config(),
        );
        Ok(Orchestrator::new(scheduler, Arc::new(self.manifest_store()?)))
    }
}

/// Compile a pipeline file, or load a compiled manifest
pub fn load_manifest(pipeline: &Path, manifest: Option<&Path>) -> Result<Manifest> {
    if let Some(path) = manifest {
        return Ok(Manifest::from_file(path)?);
    }
    let sealed = PipelineFile::from_file(pipeline)?.build()?;
    Ok(compile_pipeline(&sealed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::parse_from([
            "dagflow",
            "run",
            "ml.yaml",
            "--experiment",
            "ml",
            "-p",
            "accuracy_threshold=0.8",
            "--param",
            "bucket=my-bucket",
        ]);
        match cli.command {
            Commands::Run {
                pipeline,
                experiment,
                params,
                run_name,
                ..
            } => {
                assert_eq!(pipeline, PathBuf::from("ml.yaml"));
                assert_eq!(experiment, "ml");
                assert_eq!(params, vec!["accuracy_threshold=0.8", "bucket=my-bucket"]);
                assert!(run_name.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_formats() {
        let cli = Cli::parse_from(["dagflow", "graph", "-f", "mermaid"]);
        assert!(matches!(
            cli.command,
            Commands::Graph {
                format: GraphFormat::Mermaid,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["dagflow", "graph", "-f", "svg"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
