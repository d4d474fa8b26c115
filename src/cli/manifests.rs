// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Manifests command - manage the manifest store

use colored::Colorize;
use miette::Result;
use std::io::{self, Write};

use super::{Context, ManifestAction};
use crate::cache::ManifestStore;
use crate::utils::print_header;

/// Run the manifests command
pub async fn run(ctx: &Context, action: ManifestAction) -> Result<()> {
    let store_dir = ctx.config.state_dir().join("manifests");
    let store = ctx.manifest_store()?;

    match action {
        ManifestAction::Stats => {
            let stats = store.stats().await?;

            print_header("Manifest Store");
            println!("  Location: {}", store_dir.display());
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", stats.formatted_size());

            if let Some(oldest) = stats.oldest_entry {
                if let Ok(duration) = oldest.elapsed() {
                    println!("  Oldest:   {} ago", format_duration(duration));
                }
            }

            if let Some(newest) = stats.newest_entry {
                if let Ok(duration) = newest.elapsed() {
                    println!("  Newest:   {} ago", format_duration(duration));
                }
            }

            Ok(())
        }

        ManifestAction::Clear { yes } => {
            let stats = store.stats().await?;

            if stats.entries == 0 {
                println!("{}", "Manifest store is already empty.".dimmed());
                return Ok(());
            }

            if !yes {
                print!("Remove {} manifests ({})? [y/N] ", stats.entries, stats.formatted_size());
                io::stdout().flush().ok();

                let mut input = String::new();
                io::stdin().read_line(&mut input).ok();

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            store.clear().await?;
            println!("{}", "Manifest store cleared.".green());

            Ok(())
        }

        ManifestAction::List => {
            let listed = store.list().await?;

            print_header("Stored Manifests");
            if listed.is_empty() {
                println!("{}", "  No stored manifests.".dimmed());
                println!();
                println!("{}", "  Run 'dagflow compile --store' to add one.".dimmed());
                return Ok(());
            }

            for entry in &listed {
                let age = entry
                    .stored_at
                    .elapsed()
                    .map(|d| format!("{} ago", format_duration(d)))
                    .unwrap_or_default();
                println!(
                    "  {}  {} ({} nodes)  {}",
                    entry.digest.cyan(),
                    entry.pipeline,
                    entry.nodes,
                    age.dimmed()
                );
            }

            Ok(())
        }
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}
