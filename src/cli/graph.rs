// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::PathBuf;

use super::{load_manifest, GraphFormat};

/// Run the graph command
pub async fn run(pipeline_path: PathBuf, manifest_path: Option<PathBuf>, format: GraphFormat) -> Result<()> {
    let manifest = load_manifest(&pipeline_path, manifest_path.as_deref())?;

    let output = match format {
        GraphFormat::Text => manifest.render_text()?,
        GraphFormat::Dot => manifest.render_dot(),
        GraphFormat::Mermaid => manifest.render_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
