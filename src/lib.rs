// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! # dagflow - Declarative Workflow Orchestrator
//!
//! `dagflow` turns typed task definitions into a DAG, compiles it into a
//! deterministic manifest and runs it on a bounded worker pool while a run
//! tracker records every node transition.
//!
//! ## Features
//!
//! - **Typed wiring** - Every connection is checked against declared input and output types
//! - **Conditional branches** - Tasks can be gated on a parameter or an upstream output
//! - **Deterministic manifests** - Identical pipelines compile to byte-identical output
//! - **Tracked runs** - Experiments, runs and node states survive process restarts
//!
//! ## Quick Start
//!
//! ```bash
//! # Check a pipeline file
//! dagflow validate pipeline.yaml
//!
//! # Compile it to a manifest
//! dagflow compile pipeline.yaml -o manifest.json
//!
//! # Run it
//! dagflow run pipeline.yaml -p accuracy_threshold=0.8
//! ```

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod client;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod scheduler;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use artifact::{DataType, ParamValue, Value};
pub use client::{ManifestSource, Orchestrator};
pub use compiler::{compile, Manifest};
pub use errors::{DagflowError, DagflowResult};
pub use executors::{body_fn, BodyRegistry, LocalSubstrate, TaskBody, TaskContext, TaskOutputs};
pub use pipeline::{BodyRef, Pipeline, PipelineBuilder, TaskDefinition};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use tracker::{FilesystemTracker, InMemoryTracker, NodeStatus, Run, RunStatus, RunTracker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
