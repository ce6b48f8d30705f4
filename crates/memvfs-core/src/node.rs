// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node hierarchy: the arena holding every directory, file and link
//!
//! Directories own their children by id. Parent back-references and link
//! destinations are plain ids, so aliasing and cycles through links never
//! create ownership cycles.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{InvalidOperation, VfsError, VfsResult};
use crate::lock::LockState;
use crate::{FileTimes, Identity, NodeId, NodeKind};

pub(crate) const SELF_ENTRY: &str = ".";
pub(crate) const PARENT_ENTRY: &str = "..";

/// Child count of a directory holding only `.` and `..`
pub const EMPTY_DIR_SIZE: u64 = 2;

/// Variant payload of a node
#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    Directory { children: IndexMap<String, NodeId> },
    File { data: Vec<u8>, locks: LockState },
    Link { destination: NodeId },
}

/// Filesystem node
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) basename: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) mode: u32,
    pub(crate) times: FileTimes,
    pub(crate) data: NodeData,
}

impl Node {
    pub const DEFAULT_MODE: u32 = 0o755;
    pub const ROOT_BASENAME: &'static str = "/";

    fn with_data(
        kind: NodeKind,
        basename: &str,
        owner: Identity,
        permissions: u32,
        time: i64,
        data: NodeData,
    ) -> Self {
        let mut node = Self {
            kind,
            basename: basename.to_string(),
            parent: None,
            uid: owner.uid,
            gid: owner.gid,
            mode: 0,
            times: FileTimes::at(time),
            data,
        };
        node.set_permissions(permissions);
        node
    }

    pub(crate) fn root(owner: Identity, permissions: u32, time: i64) -> Self {
        Self::with_data(
            NodeKind::Root,
            Self::ROOT_BASENAME,
            owner,
            permissions,
            time,
            NodeData::Directory {
                children: IndexMap::new(),
            },
        )
    }

    pub(crate) fn directory(basename: &str, owner: Identity, permissions: u32, time: i64) -> Self {
        Self::with_data(
            NodeKind::Directory,
            basename,
            owner,
            permissions,
            time,
            NodeData::Directory {
                children: IndexMap::new(),
            },
        )
    }

    pub(crate) fn file(
        basename: &str,
        owner: Identity,
        permissions: u32,
        time: i64,
        data: Vec<u8>,
    ) -> Self {
        Self::with_data(
            NodeKind::File,
            basename,
            owner,
            permissions,
            time,
            NodeData::File {
                data,
                locks: LockState::new(),
            },
        )
    }

    pub(crate) fn link(
        basename: &str,
        destination: NodeId,
        owner: Identity,
        permissions: u32,
        time: i64,
    ) -> Self {
        Self::with_data(
            NodeKind::Link,
            basename,
            owner,
            permissions,
            time,
            NodeData::Link { destination },
        )
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Full mode: type tag plus permission bits
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn permissions(&self) -> u32 {
        self.mode & NodeKind::PERMISSION_MASK
    }

    pub fn times(&self) -> FileTimes {
        self.times
    }

    /// `.` and `..` entries maintained by their directory
    pub fn is_synthetic(&self) -> bool {
        self.kind == NodeKind::Link
            && (self.basename == SELF_ENTRY || self.basename == PARENT_ENTRY)
    }

    /// File content, `None` for other variants
    pub fn data(&self) -> Option<&[u8]> {
        match &self.data {
            NodeData::File { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Immediate link destination, `None` for other variants
    pub fn destination(&self) -> Option<NodeId> {
        match self.data {
            NodeData::Link { destination } => Some(destination),
            _ => None,
        }
    }

    /// Children in insertion order, `None` for non-directories
    pub fn children(&self) -> Option<impl Iterator<Item = (&str, NodeId)> + '_> {
        match &self.data {
            NodeData::Directory { children } => {
                Some(children.iter().map(|(name, id)| (name.as_str(), *id)))
            }
            _ => None,
        }
    }

    pub fn locks(&self) -> Option<&LockState> {
        match &self.data {
            NodeData::File { locks, .. } => Some(locks),
            _ => None,
        }
    }

    /// Assign permission bits; the variant's type tag is always re-applied.
    pub(crate) fn set_permissions(&mut self, permissions: u32) {
        self.mode = (permissions & NodeKind::PERMISSION_MASK) | self.kind.type_tag();
    }

    pub(crate) fn buffer_mut(&mut self) -> VfsResult<&mut Vec<u8>> {
        match &mut self.data {
            NodeData::File { data, .. } => Ok(data),
            _ => Err(VfsError::PathIsNotAFile),
        }
    }

    pub(crate) fn locks_mut(&mut self) -> VfsResult<&mut LockState> {
        match &mut self.data {
            NodeData::File { locks, .. } => Ok(locks),
            _ => Err(VfsError::PathIsNotAFile),
        }
    }

    fn children_mut(&mut self) -> VfsResult<&mut IndexMap<String, NodeId>> {
        match &mut self.data {
            NodeData::Directory { children } => Ok(children),
            _ => Err(VfsError::PathIsNotADirectory),
        }
    }
}

/// Arena of nodes addressed by stable ids
#[derive(Debug)]
pub struct NodeTree {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl NodeTree {
    /// Build a tree around `root`, whose `.` and `..` both refer to itself
    pub(crate) fn new(root: Node) -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            next_id: NodeId::ROOT.0,
        };
        let owner = Identity::new(root.uid, root.gid);
        let time = root.times.ctime;
        let root_id = tree.insert(root);
        debug_assert_eq!(root_id, NodeId::ROOT);

        let parent_link = Node::link(PARENT_ENTRY, root_id, owner, Node::DEFAULT_MODE, time);
        let parent_link_id = tree.allocate(parent_link);
        tree.attach_unchecked(root_id, parent_link_id);
        tree
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn attach_unchecked(&mut self, parent: NodeId, child: NodeId) {
        let Some(name) = self.nodes.get(&child).map(|n| n.basename.clone()) else {
            return;
        };
        if let Some(NodeData::Directory { children }) = self.nodes.get_mut(&parent).map(|n| &mut n.data) {
            children.insert(name, child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    /// Store a detached node. Directories receive their `.` entry here.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let is_directory = node.kind.is_directory();
        let owner = Identity::new(node.uid, node.gid);
        let time = node.times.ctime;
        let id = self.allocate(node);

        if is_directory {
            let self_link = Node::link(SELF_ENTRY, id, owner, Node::DEFAULT_MODE, time);
            let self_link_id = self.allocate(self_link);
            self.attach_unchecked(id, self_link_id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> VfsResult<&Node> {
        self.nodes.get(&id).ok_or(VfsError::PathNotFound)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> VfsResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(VfsError::PathNotFound)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes in the arena, synthetic entries included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach `child` under `parent`, regenerating `..` for directories.
    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) -> VfsResult<()> {
        let (name, child_kind, owner, ctime) = {
            let node = self.get(child)?;
            (
                node.basename.clone(),
                node.kind,
                Identity::new(node.uid, node.gid),
                node.times.ctime,
            )
        };
        if child_kind == NodeKind::Root {
            return Err(InvalidOperation::RootIsImmutable.into());
        }

        let children = self.get_mut(parent)?.children_mut()?;
        if children.contains_key(&name) {
            return Err(VfsError::PathAlreadyExists);
        }
        children.insert(name, child);
        self.get_mut(child)?.parent = Some(parent);

        if child_kind == NodeKind::Directory {
            let stale = self.get_mut(child)?.children_mut()?.shift_remove(PARENT_ENTRY);
            if let Some(stale) = stale {
                self.nodes.remove(&stale);
            }
            let parent_link = Node::link(PARENT_ENTRY, parent, owner, Node::DEFAULT_MODE, ctime);
            let parent_link_id = self.allocate(parent_link);
            self.attach_unchecked(child, parent_link_id);
        }
        Ok(())
    }

    pub fn child(&self, parent: NodeId, name: &str) -> VfsResult<NodeId> {
        match &self.get(parent)?.data {
            NodeData::Directory { children } => {
                children.get(name).copied().ok_or(VfsError::PathNotFound)
            }
            _ => Err(VfsError::PathNotFound),
        }
    }

    /// Detach the entry `name` from `parent` without touching its subtree
    pub(crate) fn remove_child(&mut self, parent: NodeId, name: &str) -> Option<NodeId> {
        let removed = match self.nodes.get_mut(&parent).map(|n| &mut n.data) {
            Some(NodeData::Directory { children }) => children.shift_remove(name),
            _ => None,
        };
        if let Some(id) = removed {
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.parent == Some(parent) {
                    node.parent = None;
                }
            }
        }
        removed
    }

    /// Detach a node from whichever directory currently holds it
    pub(crate) fn detach(&mut self, id: NodeId) -> VfsResult<()> {
        let node = self.get(id)?;
        if let Some(parent) = node.parent {
            let name = node.basename.clone();
            self.remove_child(parent, &name);
        }
        Ok(())
    }

    pub(crate) fn rename(&mut self, id: NodeId, basename: &str) -> VfsResult<()> {
        self.get_mut(id)?.basename = basename.to_string();
        Ok(())
    }

    /// Slash-joined basenames from Root down to the node
    pub fn path(&self, id: NodeId) -> VfsResult<String> {
        if self.get(id)?.kind == NodeKind::Root {
            return Ok(Node::ROOT_BASENAME.to_string());
        }

        let mut parts = Vec::new();
        let mut current = id;
        loop {
            let node = self.get(current)?;
            if node.kind == NodeKind::Root {
                break;
            }
            parts.push(node.basename.as_str());
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Follow a link chain to its terminal node. Non-links resolve to themselves.
    pub fn resolve(&self, id: NodeId, max_depth: usize) -> VfsResult<NodeId> {
        let mut current = id;
        let mut hops = 0;
        while let NodeData::Link { destination } = self.get(current)?.data {
            hops += 1;
            if hops > max_depth {
                trace!(start = id.0, hops, "link chain exceeded depth bound");
                return Err(VfsError::TooManyLinks);
            }
            current = destination;
        }
        Ok(current)
    }

    /// Reported size: bytes for files, child count for directories and
    /// the terminal node's size for links.
    pub fn size(&self, id: NodeId, max_depth: usize) -> VfsResult<u64> {
        let terminal = self.resolve(id, max_depth)?;
        match &self.get(terminal)?.data {
            NodeData::Directory { children } => Ok(children.len() as u64),
            NodeData::File { data, .. } => Ok(data.len() as u64),
            NodeData::Link { .. } => Err(VfsError::TooManyLinks),
        }
    }

    /// True when `ancestor` lies on the parent chain of `id` (or is `id`)
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.nodes.get(&node_id).and_then(|n| n.parent);
        }
        false
    }

    /// Drop a detached subtree from the arena. Link destinations are not
    /// followed. Nodes for which `keep` holds stay stored but parentless.
    pub(crate) fn purge(&mut self, id: NodeId, keep: impl Fn(NodeId) -> bool) -> usize {
        let mut stack = vec![id];
        let mut purged = 0;
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if let NodeData::Directory { children } = &node.data {
                stack.extend(children.values().copied());
            }
            if keep(current) {
                if let Some(node) = self.nodes.get_mut(&current) {
                    node.parent = None;
                }
                continue;
            }
            self.nodes.remove(&current);
            purged += 1;
        }
        purged
    }

    /// Remove a single parentless node, used once nothing refers to it
    pub(crate) fn discard(&mut self, id: NodeId) {
        if id != NodeId::ROOT && self.nodes.get(&id).is_some_and(|n| n.parent.is_none()) {
            self.nodes.remove(&id);
        }
    }
}
