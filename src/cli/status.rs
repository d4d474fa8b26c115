// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Status command - show a recorded run

use miette::{IntoDiagnostic, Result};

use super::run::print_run;
use super::{Context, OutputFormat};
use crate::tracker::RunTracker;

/// Run the status command
pub async fn run(ctx: &Context, run_id: String, format: OutputFormat) -> Result<()> {
    let tracker = ctx.tracker()?;
    let run = tracker.get_run(&run_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run).into_diagnostic()?),
        OutputFormat::Text => print_run(&run, ctx.verbose),
    }

    Ok(())
}
