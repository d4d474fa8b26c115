// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Compile command - turn a pipeline file into a manifest

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_manifest, Context, ManifestFormat};
use crate::cache::ManifestStore;

/// Run the compile command
pub async fn run(
    ctx: &Context,
    pipeline_path: PathBuf,
    output: Option<PathBuf>,
    format: ManifestFormat,
    store: bool,
) -> Result<()> {
    let manifest = load_manifest(&pipeline_path, None)?;

    let rendered = match format {
        ManifestFormat::Json => manifest.to_json()?,
        ManifestFormat::Yaml => manifest.to_yaml()?,
    };

    match &output {
        Some(path) => {
            std::fs::write(path, &rendered).map_err(|e| crate::errors::DagflowError::FileWriteError {
                path: path.clone(),
                error: e.to_string(),
            })?;
            eprintln!(
                "{} Compiled '{}' ({} nodes) to {}",
                "✓".green(),
                manifest.name(),
                manifest.nodes.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    if store {
        let digest = ctx.manifest_store()?.store(&manifest).await?;
        eprintln!("{} Stored manifest {}", "✓".green(), digest.cyan());
    } else if ctx.verbose {
        eprintln!("  Digest: {}", manifest.digest()?.dimmed());
    }

    Ok(())
}
