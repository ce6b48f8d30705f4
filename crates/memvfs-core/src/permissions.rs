// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Unix-style permission evaluation and metadata authorization

use crate::node::Node;
use crate::Identity;

const OWNER_READ: u32 = 0o400;
const OWNER_WRITE: u32 = 0o200;
const GROUP_READ: u32 = 0o040;
const GROUP_WRITE: u32 = 0o020;
const WORLD_READ: u32 = 0o004;
const WORLD_WRITE: u32 = 0o002;

/// Answers read/write questions for one acting identity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionChecker {
    identity: Identity,
}

impl PermissionChecker {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn user_is_root(&self) -> bool {
        self.identity.uid == Identity::ROOT_ID
    }

    pub fn user_is_owner(&self, node: &Node) -> bool {
        self.identity.uid == node.uid()
    }

    pub fn group_is_owner(&self, node: &Node) -> bool {
        self.identity.gid == node.gid()
    }

    pub fn user_can_read(&self, node: &Node) -> bool {
        self.user_is_owner(node) && node.mode() & OWNER_READ != 0
    }

    pub fn user_can_write(&self, node: &Node) -> bool {
        self.user_is_owner(node) && node.mode() & OWNER_WRITE != 0
    }

    pub fn group_can_read(&self, node: &Node) -> bool {
        self.group_is_owner(node) && node.mode() & GROUP_READ != 0
    }

    pub fn group_can_write(&self, node: &Node) -> bool {
        self.group_is_owner(node) && node.mode() & GROUP_WRITE != 0
    }

    pub fn world_can_read(&self, node: &Node) -> bool {
        node.mode() & WORLD_READ != 0
    }

    pub fn world_can_write(&self, node: &Node) -> bool {
        node.mode() & WORLD_WRITE != 0
    }

    pub fn is_readable(&self, node: &Node) -> bool {
        self.user_can_read(node) || self.group_can_read(node) || self.world_can_read(node)
    }

    pub fn is_writable(&self, node: &Node) -> bool {
        self.user_can_write(node) || self.group_can_write(node) || self.world_can_write(node)
    }

    /// Evaluate the rule registered for `field` against `node`
    pub fn authorize(&self, node: &Node, field: MetadataField) -> bool {
        match field.rule() {
            AuthRule::Owner => self.user_is_owner(node),
            AuthRule::RootOrOwner => self.user_is_root() || self.user_is_owner(node),
            AuthRule::OwnerOrWritable => self.user_is_owner(node) || self.is_writable(node),
        }
    }
}

/// Node metadata an adapter may change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Mode,
    Owner,
    Group,
    Times,
}

/// Authorization predicate required before a metadata change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthRule {
    /// Acting uid owns the node; root gets no bypass
    Owner,
    RootOrOwner,
    OwnerOrWritable,
}

impl MetadataField {
    pub const ALL: [MetadataField; 4] = [
        MetadataField::Mode,
        MetadataField::Owner,
        MetadataField::Group,
        MetadataField::Times,
    ];

    pub const fn rule(self) -> AuthRule {
        match self {
            MetadataField::Mode => AuthRule::Owner,
            MetadataField::Owner | MetadataField::Group => AuthRule::RootOrOwner,
            MetadataField::Times => AuthRule::OwnerOrWritable,
        }
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataField::Mode => write!(f, "mode"),
            MetadataField::Owner => write!(f, "owner"),
            MetadataField::Group => write!(f, "group"),
            MetadataField::Times => write!(f, "times"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: u32 = 1000;
    const GROUP: u32 = 100;

    fn file_with_mode(mode: u32) -> Node {
        Node::file("f", Identity::new(OWNER, GROUP), mode, 0, Vec::new())
    }

    #[test]
    fn test_owner_only_mode() {
        let node = file_with_mode(0o600);

        let owner = PermissionChecker::new(Identity::new(OWNER, 1));
        assert!(owner.is_readable(&node));
        assert!(owner.is_writable(&node));

        let group_member = PermissionChecker::new(Identity::new(OWNER + 1, GROUP));
        assert!(!group_member.is_readable(&node));
        assert!(!group_member.is_writable(&node));
    }

    #[test]
    fn test_world_readable_mode() {
        let node = file_with_mode(0o604);
        let stranger = PermissionChecker::new(Identity::new(OWNER + 1, GROUP + 1));
        assert!(stranger.is_readable(&node));
        assert!(!stranger.is_writable(&node));
    }

    #[test]
    fn test_group_bits_require_group_match() {
        let node = file_with_mode(0o060);
        let member = PermissionChecker::new(Identity::new(OWNER + 1, GROUP));
        let stranger = PermissionChecker::new(Identity::new(OWNER + 1, GROUP + 1));
        assert!(member.group_can_read(&node));
        assert!(member.is_writable(&node));
        assert!(!stranger.is_readable(&node));
    }

    #[test]
    fn test_root_is_not_implicitly_owner() {
        let node = file_with_mode(0o000);
        let root = PermissionChecker::new(Identity::root());
        assert!(root.user_is_root());
        assert!(!root.is_readable(&node));
        assert!(!root.authorize(&node, MetadataField::Mode));
        assert!(root.authorize(&node, MetadataField::Owner));
        assert!(root.authorize(&node, MetadataField::Group));
    }

    #[test]
    fn test_times_allowed_for_writable_non_owner() {
        let node = file_with_mode(0o666);
        let stranger = PermissionChecker::new(Identity::new(OWNER + 1, GROUP + 1));
        assert!(stranger.authorize(&node, MetadataField::Times));
        assert!(!stranger.authorize(&node, MetadataField::Mode));
        assert!(!stranger.authorize(&node, MetadataField::Owner));
    }

    #[test]
    fn test_rule_table() {
        let rules: Vec<_> = MetadataField::ALL.iter().map(|f| f.rule()).collect();
        assert_eq!(
            rules,
            vec![
                AuthRule::Owner,
                AuthRule::RootOrOwner,
                AuthRule::RootOrOwner,
                AuthRule::OwnerOrWritable
            ]
        );
    }
}
