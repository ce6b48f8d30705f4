// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Executes script commands against one shared container
//!
//! The session is the adapter layer: it performs the directory permission
//! checks a shell would (writable parents for mkdir and rm, readable
//! directories for ls and rmdir), keeps named open handles, and turns
//! engine errors into user-facing text.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use memvfs_core::registry::lock_container;
use memvfs_core::{
    Container, HandleId, Identity, InvalidOperation, NodeKind, OpenOptions, SharedContainer, Stat,
    VfsError, EMPTY_DIR_SIZE,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::identity;
use crate::script::{OpenMode, ScriptCommand, ScriptLine};

/// How listing and stat output is rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("{command}: {path}: {reason}")]
    Path {
        command: &'static str,
        path: String,
        reason: &'static str,
    },
    #[error("mv: rename {from} to {to}: {reason}")]
    Rename {
        from: String,
        to: String,
        reason: &'static str,
    },
    #[error("{command}: {name}: no such handle")]
    UnknownHandle { command: &'static str, name: String },
    #[error("open: {name}: handle name already in use")]
    HandleInUse { name: String },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CommandError {
    fn path(command: &'static str, path: &str, error: VfsError) -> Self {
        CommandError::Path {
            command,
            path: path.to_string(),
            reason: describe(error),
        }
    }

    fn denied(command: &'static str, path: &str) -> Self {
        Self::path(command, path, InvalidOperation::PermissionDenied.into())
    }
}

/// errno-style text for an engine error
pub fn describe(error: VfsError) -> &'static str {
    match error {
        VfsError::PathNotFound => "No such file or directory",
        VfsError::PathIsNotADirectory => "Not a directory",
        VfsError::PathIsNotAFile => "Is a directory",
        VfsError::PathAlreadyExists => "File exists",
        VfsError::TooManyLinks => "Too many levels of symbolic links",
        VfsError::BadHandle => "Bad file descriptor",
        VfsError::InvalidOperation(op) => match op {
            InvalidOperation::AlreadyExists => "File exists",
            InvalidOperation::IncompatibleMove => "Not a directory",
            InvalidOperation::DirectoryNotEmpty => "Directory not empty",
            InvalidOperation::NonRecursiveDirectoryRemoval => "is a directory",
            InvalidOperation::PermissionDenied => "Permission denied",
            InvalidOperation::RootIsImmutable => "Device or resource busy",
            InvalidOperation::MoveIntoSelf | InvalidOperation::SyntheticEntry => {
                "Invalid argument"
            }
        },
    }
}

/// Parent of `path`; the root is its own parent
fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// `1000(alice)`, or the bare number when the host has no name for it
fn id_label(id: u32, name: Option<String>) -> String {
    match name {
        Some(name) => format!("{}({})", id, name),
        None => id.to_string(),
    }
}

#[derive(Serialize)]
struct ListedEntry<'a> {
    name: &'a str,
    kind: NodeKind,
}

/// One failed script line
#[derive(Debug)]
pub struct Failure {
    pub line: usize,
    pub error: CommandError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: usize,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Session<W: Write> {
    container: SharedContainer,
    handles: HashMap<String, HandleId>,
    out: W,
    format: OutputFormat,
}

impl<W: Write> Session<W> {
    pub fn new(container: SharedContainer, out: W, format: OutputFormat) -> Self {
        Self {
            container,
            handles: HashMap::new(),
            out,
            format,
        }
    }

    pub fn container(&self) -> &SharedContainer {
        &self.container
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run every line in order. Without `keep_going` the first failure stops
    /// the run.
    pub fn run_script(&mut self, script: &[ScriptLine], keep_going: bool) -> RunReport {
        let mut report = RunReport::default();
        for entry in script {
            report.executed += 1;
            if let Err(error) = self.execute(&entry.command) {
                warn!(line = entry.line, command = entry.command.name(), %error, "command failed");
                report.failures.push(Failure {
                    line: entry.line,
                    error,
                });
                if !keep_going {
                    break;
                }
            }
        }
        report
    }

    pub fn execute(&mut self, command: &ScriptCommand) -> Result<(), CommandError> {
        debug!(command = command.name(), "executing");
        let shared = Arc::clone(&self.container);
        let mut vfs = lock_container(&shared);

        match command {
            ScriptCommand::Mkdir {
                path,
                parents,
                mode,
            } => self.mkdir(&mut vfs, path, *parents, *mode),
            ScriptCommand::Touch { path, mtime, atime } => {
                if !vfs.has_node_at(path) {
                    require_writable_parent(&vfs, "touch", path)?;
                }
                vfs.touch(path, *mtime, *atime)
                    .map_err(|e| CommandError::path("touch", path, e))
            }
            ScriptCommand::Write { path, data } => {
                store(&mut vfs, "write", path, &OpenOptions::create_truncate(), data)
            }
            ScriptCommand::Append { path, data } => {
                store(&mut vfs, "append", path, &OpenOptions::append(), data)
            }
            ScriptCommand::Cat { path } => self.cat(&mut vfs, path),
            ScriptCommand::Ln { target, link } => {
                require_writable_parent(&vfs, "ln", link)?;
                vfs.create_link(link, target)
                    .map(|_| ())
                    .map_err(|e| CommandError::path("ln", link, e))
            }
            ScriptCommand::Mv { from, to } => {
                vfs.move_node(from, to).map_err(|e| CommandError::Rename {
                    from: from.clone(),
                    to: to.clone(),
                    reason: describe(e),
                })
            }
            ScriptCommand::Rm { path, recursive } => {
                vfs.get_node_at(path)
                    .map_err(|e| CommandError::path("rm", path, e))?;
                require_writable_parent(&vfs, "rm", path)?;
                vfs.remove(path, *recursive)
                    .map_err(|e| CommandError::path("rm", path, e))
            }
            ScriptCommand::Rmdir { path } => rmdir(&mut vfs, path),
            ScriptCommand::Ls { path, all } => self.ls(&vfs, path, *all),
            ScriptCommand::Stat { path } => self.stat(&vfs, path),
            ScriptCommand::Chmod { mode, path } => vfs
                .set_mode(path, *mode)
                .map_err(|e| CommandError::path("chmod", path, e)),
            ScriptCommand::Chown { owner, path } => vfs
                .set_owner(path, identity::user_or_root(owner))
                .map_err(|e| CommandError::path("chown", path, e)),
            ScriptCommand::Chgrp { group, path } => vfs
                .set_group(path, identity::group_or_root(group))
                .map_err(|e| CommandError::path("chgrp", path, e)),
            ScriptCommand::Su { user, group } => {
                let uid = identity::user_or_root(user);
                let gid = match group {
                    Some(group) => identity::group_or_root(group),
                    None => vfs.identity().gid,
                };
                vfs.set_identity(Identity::new(uid, gid));
                info!(uid, gid, "switched identity");
                Ok(())
            }
            ScriptCommand::Open { name, path, mode } => {
                if self.handles.contains_key(name) {
                    return Err(CommandError::HandleInUse { name: name.clone() });
                }
                let options = match mode {
                    OpenMode::Read => OpenOptions::read_only(),
                    OpenMode::Write => OpenOptions::create_truncate(),
                    OpenMode::ReadWrite => OpenOptions::read_write(),
                    OpenMode::Append => OpenOptions::append(),
                };
                let handle = vfs
                    .open(path, &options)
                    .map_err(|e| CommandError::path("open", path, e))?;
                self.handles.insert(name.clone(), handle);
                Ok(())
            }
            ScriptCommand::Read { name, len } => {
                let handle = self.handle("read", name)?;
                let fail = |e| CommandError::path("read", name, e);
                let len = match len {
                    Some(len) => *len,
                    None => {
                        let size = vfs.fstat(handle).map_err(fail)?.size as usize;
                        size.saturating_sub(vfs.tell(handle).map_err(fail)?)
                    }
                };
                let data = vfs.read(handle, len).map_err(fail)?;
                self.out.write_all(&data)?;
                Ok(())
            }
            ScriptCommand::Put { name, data } => {
                let handle = self.handle("put", name)?;
                let written = vfs
                    .write(handle, data.as_bytes())
                    .map_err(|e| CommandError::path("put", name, e))?;
                if written < data.len() {
                    return Err(CommandError::path("put", name, VfsError::BadHandle));
                }
                Ok(())
            }
            ScriptCommand::Seek { name, position } => {
                let handle = self.handle("seek", name)?;
                vfs.seek(handle, *position)
                    .map(|_| ())
                    .map_err(|e| CommandError::path("seek", name, e))
            }
            ScriptCommand::Truncate { name, size } => {
                let handle = self.handle("truncate", name)?;
                let truncated = vfs
                    .truncate(handle, *size)
                    .map_err(|e| CommandError::path("truncate", name, e))?;
                if !truncated {
                    return Err(CommandError::path("truncate", name, VfsError::BadHandle));
                }
                Ok(())
            }
            ScriptCommand::Tell { name } => {
                let handle = self.handle("tell", name)?;
                let position = vfs
                    .tell(handle)
                    .map_err(|e| CommandError::path("tell", name, e))?;
                writeln!(self.out, "{}", position)?;
                Ok(())
            }
            ScriptCommand::Eof { name } => {
                let handle = self.handle("eof", name)?;
                let eof = vfs
                    .is_eof(handle)
                    .map_err(|e| CommandError::path("eof", name, e))?;
                writeln!(self.out, "{}", eof)?;
                Ok(())
            }
            ScriptCommand::Fstat { name } => {
                let handle = self.handle("fstat", name)?;
                let stat = vfs
                    .fstat(handle)
                    .map_err(|e| CommandError::path("fstat", name, e))?;
                self.print_stat(name, &stat)
            }
            ScriptCommand::Lock { name, operation } => {
                let handle = self.handle("lock", name)?;
                let granted = vfs
                    .lock(handle, *operation)
                    .map_err(|e| CommandError::path("lock", name, e))?;
                if granted {
                    Ok(())
                } else {
                    Err(CommandError::Path {
                        command: "lock",
                        path: name.clone(),
                        reason: "Resource temporarily unavailable",
                    })
                }
            }
            ScriptCommand::Close { name } => {
                let handle = self
                    .handles
                    .remove(name)
                    .ok_or_else(|| CommandError::UnknownHandle {
                        command: "close",
                        name: name.clone(),
                    })?;
                vfs.close(handle)
                    .map_err(|e| CommandError::path("close", name, e))
            }
        }
    }

    fn handle(&self, command: &'static str, name: &str) -> Result<HandleId, CommandError> {
        self.handles
            .get(name)
            .copied()
            .ok_or_else(|| CommandError::UnknownHandle {
                command,
                name: name.to_string(),
            })
    }

    /// Every existing ancestor up to the root must be writable.
    fn mkdir(
        &mut self,
        vfs: &mut Container,
        path: &str,
        parents: bool,
        mode: Option<u32>,
    ) -> Result<(), CommandError> {
        let checker = vfs.permission_checker();
        let mut ancestor = parent_path(path);
        loop {
            let Ok(id) = vfs.get_node_at(&ancestor) else {
                break;
            };
            let writable = vfs
                .resolve(id)
                .and_then(|target| vfs.node(target))
                .map(|node| checker.is_writable(node))
                .unwrap_or(false);
            if !writable {
                return Err(CommandError::denied("mkdir", &parent_path(path)));
            }
            if ancestor == "/" {
                break;
            }
            ancestor = parent_path(&ancestor);
        }

        vfs.create_dir(path, parents, mode).map(|_| ()).map_err(|e| {
            let shown = if e == VfsError::PathNotFound {
                parent_path(path)
            } else {
                path.to_string()
            };
            CommandError::path("mkdir", &shown, e)
        })
    }

    fn cat(&mut self, vfs: &mut Container, path: &str) -> Result<(), CommandError> {
        let fail = |e| CommandError::path("cat", path, e);
        let handle = vfs.open(path, &OpenOptions::read_only()).map_err(fail)?;
        let read = vfs
            .fstat(handle)
            .and_then(|stat| vfs.read(handle, stat.size as usize));
        vfs.close(handle).map_err(fail)?;
        self.out.write_all(&read.map_err(fail)?)?;
        Ok(())
    }

    fn ls(&mut self, vfs: &Container, path: &str, all: bool) -> Result<(), CommandError> {
        let fail = |e| CommandError::path("ls", path, e);
        let id = vfs.get_node_at(path).and_then(|id| vfs.resolve(id)).map_err(fail)?;
        let node = vfs.node(id).map_err(fail)?;
        if !node.kind().is_directory() {
            return Err(fail(VfsError::PathIsNotADirectory));
        }
        if !vfs.permission_checker().is_readable(node) {
            return Err(CommandError::denied("ls", path));
        }

        let entries = vfs.read_dir(path).map_err(fail)?;
        let listed: Vec<ListedEntry<'_>> = entries
            .iter()
            .filter(|entry| all || (entry.name != "." && entry.name != ".."))
            .map(|entry| ListedEntry {
                name: &entry.name,
                kind: entry.kind,
            })
            .collect();

        match self.format {
            OutputFormat::Text => {
                for entry in &listed {
                    writeln!(self.out, "{}", entry.name)?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &listed)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn stat(&mut self, vfs: &Container, path: &str) -> Result<(), CommandError> {
        let stat = vfs
            .stat(path)
            .map_err(|e| CommandError::path("stat", path, e))?;
        self.print_stat(path, &stat)
    }

    fn print_stat(&mut self, label: &str, stat: &Stat) -> Result<(), CommandError> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "{}: {} mode={:o} uid={} gid={} size={} atime={} mtime={} ctime={}",
                label,
                stat.kind,
                stat.mode,
                id_label(stat.uid, identity::user_name(stat.uid)),
                id_label(stat.gid, identity::group_name(stat.gid)),
                stat.size,
                stat.atime,
                stat.mtime,
                stat.ctime
            )?,
            OutputFormat::Json => {
                let value = serde_json::json!({ "path": label, "stat": stat });
                serde_json::to_writer(&mut self.out, &value)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

fn require_writable_parent(
    vfs: &Container,
    command: &'static str,
    path: &str,
) -> Result<(), CommandError> {
    let parent = parent_path(path);
    let fail = |e| CommandError::path(command, path, e);
    let id = vfs
        .get_node_at(&parent)
        .and_then(|id| vfs.resolve(id))
        .map_err(fail)?;
    if !vfs.permission_checker().is_writable(vfs.node(id).map_err(fail)?) {
        return Err(CommandError::denied(command, path));
    }
    Ok(())
}

/// Open, write `data` and close
fn store(
    vfs: &mut Container,
    command: &'static str,
    path: &str,
    options: &OpenOptions,
    data: &str,
) -> Result<(), CommandError> {
    let fail = |e| CommandError::path(command, path, e);
    let handle = vfs.open(path, options).map_err(fail)?;
    let written = vfs.write(handle, data.as_bytes());
    vfs.close(handle).map_err(fail)?;
    written.map_err(fail)?;
    Ok(())
}

/// Remove an empty, readable directory. Links are not followed.
fn rmdir(vfs: &mut Container, path: &str) -> Result<(), CommandError> {
    let fail = |e| CommandError::path("rmdir", path, e);
    let id = vfs.get_directory_at(path).map_err(fail)?;
    if !vfs.permission_checker().is_readable(vfs.node(id).map_err(fail)?) {
        return Err(CommandError::denied("rmdir", path));
    }
    if vfs.size_of(id).map_err(fail)? > EMPTY_DIR_SIZE {
        return Err(fail(InvalidOperation::DirectoryNotEmpty.into()));
    }
    vfs.remove(path, true).map_err(fail)
}
