// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::node::Node;
use crate::Identity;

/// Settings a Container is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VfsConfig {
    /// Acting user/group stamped on new nodes and used for permission checks
    pub identity: Identity,

    /// Permission bits given to freshly created nodes
    pub default_mode: u32,

    /// Maximum number of links followed while resolving one chain
    pub max_link_depth: usize,
}

impl VfsConfig {
    pub const DEFAULT_MAX_LINK_DEPTH: usize = 40;

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: VfsConfig =
            toml::from_str(raw).map_err(|source| ConfigError::ParseToml { source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_mode & !0o7777 != 0 {
            return Err(ConfigError::Invalid {
                field: "default-mode",
                details: format!("{:#o} carries bits outside 0o7777", self.default_mode),
            });
        }
        if self.max_link_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max-link-depth",
                details: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            identity: Identity::root(),
            default_mode: Node::DEFAULT_MODE,
            max_link_depth: Self::DEFAULT_MAX_LINK_DEPTH,
        }
    }
}
