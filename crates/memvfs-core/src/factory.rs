// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node construction stamped with the acting identity and the current time

use crate::node::Node;
use crate::types::current_timestamp;
use crate::{Identity, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Factory {
    identity: Identity,
    default_mode: u32,
}

impl Factory {
    pub fn new(identity: Identity, default_mode: u32) -> Self {
        Self {
            identity,
            default_mode,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub fn default_mode(&self) -> u32 {
        self.default_mode
    }

    pub fn create_root(&self) -> Node {
        Node::root(self.identity, self.default_mode, current_timestamp())
    }

    pub fn create_dir(&self, basename: &str) -> Node {
        Node::directory(basename, self.identity, self.default_mode, current_timestamp())
    }

    pub fn create_file(&self, basename: &str, data: Vec<u8>) -> Node {
        Node::file(
            basename,
            self.identity,
            self.default_mode,
            current_timestamp(),
            data,
        )
    }

    pub fn create_link(&self, basename: &str, destination: NodeId) -> Node {
        Node::link(
            basename,
            destination,
            self.identity,
            self.default_mode,
            current_timestamp(),
        )
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(Identity::root(), Node::DEFAULT_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKind;

    #[test]
    fn test_nodes_are_stamped_with_identity() {
        let factory = Factory::new(Identity::new(501, 20), 0o700);
        let dir = factory.create_dir("d");
        assert_eq!((dir.uid(), dir.gid()), (501, 20));
        assert_eq!(dir.mode(), 0o040_700);
        assert_eq!(dir.kind(), NodeKind::Directory);

        let file = factory.create_file("f", b"abc".to_vec());
        assert_eq!(file.mode(), 0o100_700);
        assert_eq!(file.data(), Some(&b"abc"[..]));
        assert!(file.times().ctime > 0);
    }

    #[test]
    fn test_root_and_link_variants() {
        let factory = Factory::default();
        let root = factory.create_root();
        assert_eq!(root.kind(), NodeKind::Root);
        assert_eq!(root.basename(), "/");

        let link = factory.create_link("l", NodeId::ROOT);
        assert_eq!(link.kind(), NodeKind::Link);
        assert_eq!(link.destination(), Some(NodeId::ROOT));
        assert_eq!(link.mode(), 0o120_755);
    }
}
