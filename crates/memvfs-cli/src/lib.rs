// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memvfs CLI - drive an in-memory filesystem from a command script

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memvfs_core::registry::lock_container;
use memvfs_core::{Identity, Registry, VfsConfig};
use memvfs_logging::CliLoggingArgs;
use tracing::info;

pub mod identity;
pub mod script;
pub mod session;

// Re-export key types
pub use script::{parse_script, ParseError, ScriptCommand, ScriptLine};
pub use session::{describe, CommandError, OutputFormat, RunReport, Session};

#[derive(Parser, Debug)]
#[command(
    name = "memvfs",
    author,
    version,
    about = "Run filesystem command scripts against an in-memory tree"
)]
pub struct Cli {
    /// TOML file with identity, default-mode and max-link-depth
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Acting user id (defaults to the config file, then the current process)
    #[arg(long, global = true)]
    pub uid: Option<u32>,

    /// Acting group id (defaults to the config file, then the current process)
    #[arg(long, global = true)]
    pub gid: Option<u32>,

    /// Rendering of ls and stat output
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a script file (use '-' for stdin)
    Run {
        script: PathBuf,
        /// Continue after a failing command
        #[arg(long)]
        keep_going: bool,
    },
    /// Execute each argument as one script line
    Exec {
        #[arg(required = true)]
        commands: Vec<String>,
        /// Continue after a failing command
        #[arg(long)]
        keep_going: bool,
    },
}

impl Cli {
    /// Config file settings with the identity overrides applied
    pub fn vfs_config(&self) -> Result<VfsConfig> {
        let mut config = match &self.config {
            Some(path) => VfsConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => VfsConfig::default().with_identity(identity::process_identity()),
        };
        config.identity = Identity::new(
            self.uid.unwrap_or(config.identity.uid),
            self.gid.unwrap_or(config.identity.gid),
        );
        Ok(config)
    }
}

fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read script {:?}", path))
    }
}

/// Execute the selected subcommand against a fresh container, writing
/// command output to `out`.
pub fn run<W: Write>(cli: &Cli, out: W) -> Result<RunReport> {
    let config = cli.vfs_config()?;
    let (script, keep_going) = match &cli.command {
        Command::Run { script, keep_going } => (parse_script(&read_script(script)?)?, *keep_going),
        Command::Exec {
            commands,
            keep_going,
        } => (parse_script(&commands.join("\n"))?, *keep_going),
    };

    let registry = Registry::global();
    let (id, container) = registry.create(&config);
    info!(
        container = %id,
        uid = config.identity.uid,
        gid = config.identity.gid,
        commands = script.len(),
        "running script"
    );

    let mut session = Session::new(container, out, cli.format);
    let report = session.run_script(&script, keep_going);
    let left_open = lock_container(session.container()).open_handles();
    if left_open > 0 {
        info!(container = %id, left_open, "script finished with open handles");
    }
    registry.destroy(id);
    Ok(report)
}
