// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for memvfs

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable arena index of a node. Never reused within one container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// The root directory always occupies the first slot
    pub const ROOT: NodeId = NodeId(0);

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Opaque handle identifier. Also the requester identity for advisory locks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Acting user/group pair, already resolved to numeric ids
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub const ROOT_ID: u32 = 0;

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    pub fn root() -> Self {
        Self::new(Self::ROOT_ID, Self::ROOT_ID)
    }
}

/// Node variant, used for stat type tags and variant-checked lookups
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Directory,
    File,
    Link,
}

impl NodeKind {
    pub const TYPE_MASK: u32 = 0o170_000;
    pub const PERMISSION_MASK: u32 = 0o7_777;

    /// Stat type tag carried in the high bits of every mode value
    pub const fn type_tag(self) -> u32 {
        match self {
            NodeKind::Root | NodeKind::Directory => 0o040_000,
            NodeKind::File => 0o100_000,
            NodeKind::Link => 0o120_000,
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Directory)
    }

    /// Root counts as a directory when comparing variants for a move
    pub(crate) fn same_variant(self, other: NodeKind) -> bool {
        (self.is_directory() && other.is_directory()) || self == other
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Root => write!(f, "root"),
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::File => write!(f, "file"),
            NodeKind::Link => write!(f, "link"),
        }
    }
}

/// Node timestamps, seconds since the Unix epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileTimes {
    pub fn at(time: i64) -> Self {
        Self {
            atime: time,
            mtime: time,
            ctime: time,
        }
    }
}

pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Attributes an adapter needs for stat emulation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
}

impl Stat {
    pub fn permissions(&self) -> u32 {
        self.mode & NodeKind::PERMISSION_MASK
    }
}

/// Directory entry information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// File open options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Write-only, creating the file when missing and clearing existing content
    pub fn create_truncate() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Write-only, creating the file when missing and positioning at its end
    pub fn append() -> Self {
        Self {
            write: true,
            create: true,
            append: true,
            ..Default::default()
        }
    }
}

/// Advisory lock request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOperation {
    Shared,
    Exclusive,
    Unlock,
}

impl std::str::FromStr for LockOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sh" | "shared" => Ok(LockOperation::Shared),
            "ex" | "exclusive" => Ok(LockOperation::Exclusive),
            "un" | "unlock" => Ok(LockOperation::Unlock),
            _ => Err(format!(
                "Invalid lock operation: {}. Use 'shared', 'exclusive' or 'unlock'",
                s
            )),
        }
    }
}
