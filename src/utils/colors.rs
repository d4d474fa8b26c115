// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::tracker::{NodeStatus, RunStatus};

/// Colored label for a run status
pub fn run_status(status: RunStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Succeeded => label.green().bold(),
        RunStatus::Failed => label.red().bold(),
        RunStatus::Cancelled => label.yellow().bold(),
        RunStatus::Pending | RunStatus::Running => label.blue(),
    }
}

/// Status marker and colored label for a node
pub fn node_status(status: NodeStatus) -> (ColoredString, ColoredString) {
    let label = status.to_string();
    match status {
        NodeStatus::Succeeded => ("✓".green(), label.green()),
        NodeStatus::Failed => ("✗".red(), label.red()),
        NodeStatus::Skipped => ("○".dimmed(), label.dimmed()),
        NodeStatus::Running => ("→".blue(), label.blue()),
        NodeStatus::Pending | NodeStatus::Ready => ("·".dimmed(), label.normal()),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.len().max(40)));
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}
