// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memvfs core: in-memory virtual filesystem engine
//!
//! This crate provides:
//! - A node arena of directories, files and links with `.`/`..` entries
//! - Path resolution through link chains and tree mutation (`Container`)
//! - Unix-style permission evaluation and metadata authorization
//! - Per-open cursors over file buffers and whole-file advisory locks
//! - A process-wide registry of live containers
//!
//! The engine is synchronous and single-threaded; share a container across
//! threads through the [`registry`] mutex.

pub mod config;
pub mod container;
pub mod error;
pub mod factory;
pub mod handle;
pub mod lock;
pub mod node;
pub mod permissions;
pub mod registry;
pub mod types;

// Re-export key types
pub use config::VfsConfig;
pub use container::Container;
pub use error::{ConfigError, InvalidOperation, VfsError, VfsResult};
pub use factory::Factory;
pub use handle::{Access, FileHandle};
pub use lock::LockState;
pub use node::{Node, NodeTree, EMPTY_DIR_SIZE};
pub use permissions::{AuthRule, MetadataField, PermissionChecker};
pub use registry::{ContainerId, Registry, SharedContainer};
pub use types::{
    DirEntry, FileTimes, HandleId, Identity, LockOperation, NodeId, NodeKind, OpenOptions, Stat,
};
