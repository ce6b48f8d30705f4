// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Result};
use clap::Parser;
use memvfs_cli::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init("memvfs-cli")?;

    let report = run(&cli, std::io::stdout().lock())?;
    for failure in &report.failures {
        eprintln!("memvfs: line {}: {}", failure.line, failure.error);
    }
    if !report.succeeded() {
        bail!(
            "{} of {} commands failed",
            report.failures.len(),
            report.executed
        );
    }
    Ok(())
}
