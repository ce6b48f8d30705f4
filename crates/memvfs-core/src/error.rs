// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the memvfs engine

/// Operations that are rejected even though every path involved resolved
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOperation {
    #[error("already exists")]
    AlreadyExists,
    #[error("can't move across node kinds")]
    IncompatibleMove,
    #[error("can't override non-empty directory")]
    DirectoryNotEmpty,
    #[error("won't non-recursively remove directory")]
    NonRecursiveDirectoryRemoval,
    #[error("permission denied")]
    PermissionDenied,
    #[error("root directory can't be moved, removed or reparented")]
    RootIsImmutable,
    #[error("can't move a directory into itself")]
    MoveIntoSelf,
    #[error("synthetic directory entry")]
    SyntheticEntry,
}

/// Core filesystem error type
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    #[error("path not found")]
    PathNotFound,
    #[error("path is not a directory")]
    PathIsNotADirectory,
    #[error("path is not a file")]
    PathIsNotAFile,
    #[error("path already exists")]
    PathAlreadyExists,
    #[error("too many levels of links")]
    TooManyLinks,
    #[error("bad file handle")]
    BadHandle,
    #[error("invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised while loading a [`crate::VfsConfig`]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {source}")]
    ParseToml {
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for '{field}': {details}")]
    Invalid { field: &'static str, details: String },
}
