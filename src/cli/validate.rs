// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::Context;
use crate::errors::RecoverySuggestion;
use crate::pipeline::{PipelineFile, PipelineValidator};
use crate::utils::{print_success, print_warning};

/// Run the validate command
pub async fn run(ctx: &Context, pipeline_path: PathBuf) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let file = match PipelineFile::from_file(&pipeline_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("  {} Failed to load pipeline", "✗".red());
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!();
                eprintln!("{}", suggestion);
            }
            return Err(e.into());
        }
    };
    print_success("Pipeline file is valid YAML");

    let builder = file.to_builder()?;
    let validation = PipelineValidator::validate(&builder);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if ctx.verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", file.name);
        println!("  Parameters: {}", file.parameters.len());
        println!("  Tasks: {}", builder.nodes().len());
        for node in builder.nodes() {
            let condition = if node.condition().is_empty() {
                String::new()
            } else {
                format!(" [if {}]", node.condition())
            };
            println!(
                "    - {} ({}){}",
                node.id(),
                node.definition().name,
                condition.dimmed()
            );
        }
    }

    println!();

    if validation.is_valid() {
        if validation.has_warnings() {
            println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        } else {
            println!("{}", "Pipeline is valid!".green().bold());
        }
        return Ok(());
    }

    if let Err(first) = builder.seal() {
        if let Some(suggestion) = RecoverySuggestion::for_error(&first) {
            println!("{}", suggestion);
        }
    }
    Err(miette::miette!("Pipeline validation failed"))
}
