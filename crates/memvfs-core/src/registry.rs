// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process-wide registry of live containers
//!
//! Adapters create a container here, keep the returned id and look the
//! container up again when a request arrives. The per-container mutex is
//! the single point that serializes access to one tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::debug;

use crate::{Container, VfsConfig};

/// Opaque registry key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vfs-{}", self.0)
    }
}

pub type SharedContainer = Arc<Mutex<Container>>;

#[derive(Debug, Default)]
pub struct Registry {
    containers: Mutex<HashMap<ContainerId, SharedContainer>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ContainerId, SharedContainer>> {
        self.containers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, config: &VfsConfig) -> (ContainerId, SharedContainer) {
        let id = ContainerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let container = Arc::new(Mutex::new(Container::new(config)));
        self.entries().insert(id, Arc::clone(&container));
        debug!(container = %id, "registered container");
        (id, container)
    }

    pub fn get(&self, id: ContainerId) -> Option<SharedContainer> {
        self.entries().get(&id).cloned()
    }

    /// Unregister a container. Clones held elsewhere keep it alive.
    pub fn destroy(&self, id: ContainerId) -> bool {
        let removed = self.entries().remove(&id).is_some();
        if removed {
            debug!(container = %id, "destroyed container");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Lock a shared container, recovering the guard if a holder panicked
pub fn lock_container(container: &SharedContainer) -> MutexGuard<'_, Container> {
    container.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_destroy() {
        let registry = Registry::new();
        let (id, container) = registry.create(&VfsConfig::default());
        assert_eq!(registry.len(), 1);

        lock_container(&container).create_file("/f", "x").unwrap();
        let again = registry.get(id).unwrap();
        assert!(lock_container(&again).has_node_at("/f"));

        assert!(registry.destroy(id));
        assert!(!registry.destroy(id));
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_distinct() {
        let registry = Registry::new();
        let (a, _) = registry.create(&VfsConfig::default());
        let (b, _) = registry.create(&VfsConfig::default());
        assert_ne!(a, b);
        assert_eq!(format!("{}", a), "vfs-0");
    }

    #[test]
    fn test_global_is_shared() {
        let (id, _) = Registry::global().create(&VfsConfig::default());
        assert!(Registry::global().get(id).is_some());
        Registry::global().destroy(id);
    }

    #[test]
    fn test_containers_are_isolated() {
        let registry = Registry::new();
        let (_, a) = registry.create(&VfsConfig::default());
        let (_, b) = registry.create(&VfsConfig::default());
        lock_container(&a).create_dir("/only-a", false, None).unwrap();
        assert!(!lock_container(&b).has_node_at("/only-a"));
    }
}
