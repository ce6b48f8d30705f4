// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path resolution and tree mutation over one node arena
//!
//! Paths are slash separated (back-slashes are accepted as separators) and
//! always resolved from the root. Every link met before the last segment is
//! followed; the last segment names the node itself, so a trailing link is
//! returned as a link.
//!
//! Mutating operations check all of their preconditions before touching the
//! tree. A failed call leaves the container as it was.

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;

use tracing::{debug, trace, warn};

use crate::error::{InvalidOperation, VfsError, VfsResult};
use crate::factory::Factory;
use crate::handle::{Access, FileHandle};
use crate::node::{Node, NodeTree, EMPTY_DIR_SIZE};
use crate::permissions::{MetadataField, PermissionChecker};
use crate::types::current_timestamp;
use crate::{
    DirEntry, HandleId, Identity, LockOperation, NodeId, NodeKind, OpenOptions, Stat, VfsConfig,
};

fn segments(path: &str) -> Vec<String> {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn join(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

/// Split into parent segments and basename. `None` for the root path.
fn split_parent(path: &str) -> Option<(Vec<String>, String)> {
    let mut parts = segments(path);
    let name = parts.pop()?;
    Some((parts, name))
}

fn is_synthetic_name(name: &str) -> bool {
    name == "." || name == ".."
}

pub struct Container {
    tree: NodeTree,
    factory: Factory,
    max_link_depth: usize,
    handles: HashMap<HandleId, FileHandle>,
    next_handle: u64,
}

impl Container {
    pub fn new(config: &VfsConfig) -> Self {
        let factory = Factory::new(config.identity, config.default_mode);
        let tree = NodeTree::new(factory.create_root());
        debug!(
            uid = config.identity.uid,
            gid = config.identity.gid,
            "created container"
        );
        Self {
            tree,
            factory,
            max_link_depth: config.max_link_depth,
            handles: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self::new(&VfsConfig::default().with_identity(identity))
    }

    pub fn identity(&self) -> Identity {
        self.factory.identity()
    }

    /// Switch the acting identity for subsequent creations and checks
    pub fn set_identity(&mut self, identity: Identity) {
        self.factory.set_identity(identity);
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn permission_checker(&self) -> PermissionChecker {
        PermissionChecker::new(self.factory.identity())
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> VfsResult<&Node> {
        self.tree.get(id)
    }

    pub fn path_of(&self, id: NodeId) -> VfsResult<String> {
        self.tree.path(id)
    }

    /// Follow a link chain from `id` to its terminal node
    pub fn resolve(&self, id: NodeId) -> VfsResult<NodeId> {
        self.tree.resolve(id, self.max_link_depth)
    }

    pub fn size_of(&self, id: NodeId) -> VfsResult<u64> {
        self.tree.size(id, self.max_link_depth)
    }

    fn walk(&self, parts: &[String]) -> VfsResult<NodeId> {
        let mut current = NodeId::ROOT;
        for part in parts {
            current = self.resolve(current)?;
            if self.tree.get(current)?.kind() == NodeKind::File {
                return Err(VfsError::PathNotFound);
            }
            current = self.tree.child(current, part)?;
        }
        Ok(current)
    }

    // Lookups

    pub fn get_node_at(&self, path: &str) -> VfsResult<NodeId> {
        let result = self.walk(&segments(path));
        trace!(path, ?result, "resolved path");
        result
    }

    pub fn has_node_at(&self, path: &str) -> bool {
        self.get_node_at(path).is_ok()
    }

    pub fn get_directory_at(&self, path: &str) -> VfsResult<NodeId> {
        let id = self.get_node_at(path)?;
        if !self.tree.get(id)?.kind().is_directory() {
            return Err(VfsError::PathIsNotADirectory);
        }
        Ok(id)
    }

    pub fn get_file_at(&self, path: &str) -> VfsResult<NodeId> {
        let id = self.get_node_at(path)?;
        if self.tree.get(id)?.kind() != NodeKind::File {
            return Err(VfsError::PathIsNotAFile);
        }
        Ok(id)
    }

    /// Directory that would hold a node at the given parent segments. A
    /// trailing link is followed.
    fn parent_directory(&self, parts: &[String]) -> VfsResult<NodeId> {
        let id = self.resolve(self.walk(parts)?)?;
        if !self.tree.get(id)?.kind().is_directory() {
            return Err(VfsError::PathIsNotADirectory);
        }
        Ok(id)
    }

    /// Segments from the first one that does not resolve onwards
    fn missing_segments<'a>(&self, parts: &'a [String]) -> impl Iterator<Item = &'a str> {
        let existing = (0..=parts.len())
            .rev()
            .find(|&len| self.walk(&parts[..len]).is_ok())
            .unwrap_or(0);
        parts[existing..].iter().map(String::as_str)
    }

    /// Store `node` and attach it under `parent`, discarding it on failure
    fn attach(&mut self, parent: NodeId, node: Node) -> VfsResult<NodeId> {
        let id = self.tree.insert(node);
        if let Err(e) = self.tree.add_child(parent, id) {
            self.tree.purge(id, |_| false);
            return Err(e);
        }
        Ok(id)
    }

    /// Drop a detached subtree, sparing files that still have open handles
    fn purge_detached(&mut self, id: NodeId) {
        let open: HashSet<NodeId> = self.handles.values().map(FileHandle::node).collect();
        let purged = self.tree.purge(id, |node| open.contains(&node));
        trace!(node = id.as_u64(), purged, "purged detached subtree");
    }

    // Tree mutation

    pub fn create_dir(&mut self, path: &str, recursive: bool, mode: Option<u32>) -> VfsResult<NodeId> {
        let Some((parent_parts, name)) = split_parent(path) else {
            return Err(VfsError::PathAlreadyExists);
        };
        // Ancestors are built before the leaf, so every segment that could be
        // created must be a real name up front.
        if is_synthetic_name(&name) {
            return Err(InvalidOperation::SyntheticEntry.into());
        }
        if recursive && self.missing_segments(&parent_parts).any(is_synthetic_name) {
            return Err(InvalidOperation::SyntheticEntry.into());
        }

        let parent = match self.parent_directory(&parent_parts) {
            Ok(parent) => parent,
            Err(VfsError::PathNotFound) if recursive => {
                self.create_dir(&join(&parent_parts), true, mode)?
            }
            Err(e) => return Err(e),
        };
        if self.tree.child(parent, &name).is_ok() {
            return Err(VfsError::PathAlreadyExists);
        }

        let mut dir = self.factory.create_dir(&name);
        if let Some(mode) = mode {
            dir.set_permissions(mode);
        }
        let id = self.attach(parent, dir)?;
        debug!(path, mode = ?mode, "created directory");
        Ok(id)
    }

    pub fn create_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> VfsResult<NodeId> {
        if self.has_node_at(path) {
            return Err(InvalidOperation::AlreadyExists.into());
        }
        let Some((parent_parts, name)) = split_parent(path) else {
            return Err(InvalidOperation::AlreadyExists.into());
        };
        let parent = self.parent_directory(&parent_parts)?;

        let file = self.factory.create_file(&name, data.into());
        let id = self.attach(parent, file)?;
        debug!(path, "created file");
        Ok(id)
    }

    pub fn create_link(&mut self, path: &str, destination: &str) -> VfsResult<NodeId> {
        let target = self.get_node_at(destination)?;
        if self.has_node_at(path) {
            return Err(InvalidOperation::AlreadyExists.into());
        }
        let Some((parent_parts, name)) = split_parent(path) else {
            return Err(InvalidOperation::AlreadyExists.into());
        };
        let parent = self.parent_directory(&parent_parts)?;

        let link = self.factory.create_link(&name, target);
        let id = self.attach(parent, link)?;
        debug!(path, destination, "created link");
        Ok(id)
    }

    /// Relocate the node at `from` to `to`.
    ///
    /// An existing node at `to` of the same kind is replaced, unless it is
    /// a directory holding real entries.
    pub fn move_node(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let source = self.get_node_at(from)?;
        if source == NodeId::ROOT {
            return Err(InvalidOperation::RootIsImmutable.into());
        }
        let (source_kind, source_synthetic) = {
            let node = self.tree.get(source)?;
            (node.kind(), node.is_synthetic())
        };
        if source_synthetic {
            return Err(InvalidOperation::SyntheticEntry.into());
        }

        let Some((parent_parts, name)) = split_parent(to) else {
            return Err(InvalidOperation::RootIsImmutable.into());
        };
        if is_synthetic_name(&name) {
            return Err(InvalidOperation::SyntheticEntry.into());
        }
        let target_parent = self.parent_directory(&parent_parts)?;

        let existing = match self.tree.child(target_parent, &name) {
            Ok(id) => Some(id),
            Err(VfsError::PathNotFound) => None,
            Err(e) => return Err(e),
        };
        if existing == Some(source) {
            return Ok(());
        }
        if source_kind.is_directory() && self.tree.is_ancestor(source, target_parent) {
            return Err(InvalidOperation::MoveIntoSelf.into());
        }
        if let Some(existing) = existing {
            let existing_kind = self.tree.get(existing)?.kind();
            if !existing_kind.same_variant(source_kind) {
                warn!(from, to, %source_kind, %existing_kind, "can't move across node kinds");
                return Err(InvalidOperation::IncompatibleMove.into());
            }
            if existing_kind.is_directory() && self.size_of(existing)? > EMPTY_DIR_SIZE {
                return Err(InvalidOperation::DirectoryNotEmpty.into());
            }
        }

        if let Some(existing) = existing {
            self.tree.detach(existing)?;
            self.purge_detached(existing);
        }
        self.tree.detach(source)?;
        self.tree.rename(source, &name)?;
        self.tree.add_child(target_parent, source)?;
        self.tree.get_mut(source)?.times.ctime = current_timestamp();

        debug!(from, to, replaced = existing.is_some(), "moved node");
        Ok(())
    }

    pub fn remove(&mut self, path: &str, recursive: bool) -> VfsResult<()> {
        let id = self.get_node_at(path)?;
        if id == NodeId::ROOT {
            return Err(InvalidOperation::RootIsImmutable.into());
        }
        let node = self.tree.get(id)?;
        if node.is_synthetic() {
            return Err(InvalidOperation::SyntheticEntry.into());
        }
        if !recursive && node.kind().is_directory() {
            return Err(InvalidOperation::NonRecursiveDirectoryRemoval.into());
        }

        self.tree.detach(id)?;
        self.purge_detached(id);
        debug!(path, recursive, "removed node");
        Ok(())
    }

    // Attributes and listing

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        self.stat_node(self.get_node_at(path)?)
    }

    pub fn fstat(&self, handle: HandleId) -> VfsResult<Stat> {
        let handle = self.handles.get(&handle).ok_or(VfsError::BadHandle)?;
        self.stat_node(handle.node())
    }

    /// Attributes of the node itself; only the size looks through links.
    pub fn stat_node(&self, id: NodeId) -> VfsResult<Stat> {
        let node = self.tree.get(id)?;
        let times = node.times();
        Ok(Stat {
            kind: node.kind(),
            mode: node.mode(),
            uid: node.uid(),
            gid: node.gid(),
            atime: times.atime,
            mtime: times.mtime,
            ctime: times.ctime,
            size: self.size_of(id)?,
        })
    }

    /// Entries of the directory at `path` in insertion order. `..` is re-added
    /// last whenever the directory is reparented.
    pub fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let id = self.resolve(self.get_node_at(path)?)?;
        let children = self
            .tree
            .get(id)?
            .children()
            .ok_or(VfsError::PathIsNotADirectory)?;

        children
            .map(|(name, child)| {
                Ok(DirEntry {
                    name: name.to_string(),
                    kind: self.tree.get(child)?.kind(),
                })
            })
            .collect()
    }

    // Metadata

    fn authorize(&self, id: NodeId, field: MetadataField) -> VfsResult<()> {
        let node = self.tree.get(id)?;
        let checker = self.permission_checker();
        if !checker.authorize(node, field) {
            warn!(
                node = id.as_u64(),
                %field,
                uid = checker.identity().uid,
                owner = node.uid(),
                "metadata change denied"
            );
            return Err(InvalidOperation::PermissionDenied.into());
        }
        Ok(())
    }

    /// Change permission bits of the node a path ultimately refers to
    pub fn set_mode(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        let id = self.resolve(self.get_node_at(path)?)?;
        self.authorize(id, MetadataField::Mode)?;

        let node = self.tree.get_mut(id)?;
        node.set_permissions(mode);
        node.times.ctime = current_timestamp();
        debug!(path, mode = format_args!("{:o}", mode), "changed mode");
        Ok(())
    }

    pub fn set_owner(&mut self, path: &str, uid: u32) -> VfsResult<()> {
        let id = self.get_node_at(path)?;
        self.authorize(id, MetadataField::Owner)?;

        let node = self.tree.get_mut(id)?;
        node.uid = uid;
        node.times.ctime = current_timestamp();
        debug!(path, uid, "changed owner");
        Ok(())
    }

    pub fn set_group(&mut self, path: &str, gid: u32) -> VfsResult<()> {
        let id = self.get_node_at(path)?;
        self.authorize(id, MetadataField::Group)?;

        let node = self.tree.get_mut(id)?;
        node.gid = gid;
        node.times.ctime = current_timestamp();
        debug!(path, gid, "changed group");
        Ok(())
    }

    /// Update timestamps, creating an empty file when nothing exists at `path`.
    ///
    /// `mtime` defaults to now and `atime` defaults to `mtime`.
    pub fn touch(&mut self, path: &str, mtime: Option<i64>, atime: Option<i64>) -> VfsResult<()> {
        if !self.has_node_at(path) {
            self.create_file(path, Vec::new())?;
        }
        let id = self.get_node_at(path)?;
        self.authorize(id, MetadataField::Times)?;

        let time = mtime.unwrap_or_else(current_timestamp);
        let node = self.tree.get_mut(id)?;
        node.times.ctime = time;
        node.times.mtime = time;
        node.times.atime = atime.unwrap_or(time);
        debug!(path, time, "touched node");
        Ok(())
    }

    // Open handles

    /// Open the file at `path`, following a trailing link.
    pub fn open(&mut self, path: &str, options: &OpenOptions) -> VfsResult<HandleId> {
        let checker = self.permission_checker();

        if !self.has_node_at(path) {
            if !options.create {
                return Err(VfsError::PathNotFound);
            }
            let Some((parent_parts, _)) = split_parent(path) else {
                return Err(VfsError::PathIsNotAFile);
            };
            let parent = self.parent_directory(&parent_parts)?;
            if !checker.is_writable(self.tree.get(parent)?) {
                warn!(path, uid = checker.identity().uid, "create denied by parent permissions");
                return Err(InvalidOperation::PermissionDenied.into());
            }
            self.create_file(path, Vec::new())?;
        }

        let id = self.resolve(self.get_node_at(path)?)?;
        let node = self.tree.get(id)?;
        if node.kind() != NodeKind::File {
            return Err(VfsError::PathIsNotAFile);
        }

        let wants_write = options.write || options.append || options.truncate;
        let access = match (options.read, wants_write) {
            (true, true) => Access::READ_WRITE,
            (_, false) => Access::READ_ONLY,
            (false, true) => Access::WRITE_ONLY,
        };
        let allowed = (!access.read || checker.is_readable(node))
            && (!access.write || checker.is_writable(node));
        if !allowed {
            warn!(path, uid = checker.identity().uid, ?access, "open denied");
            return Err(InvalidOperation::PermissionDenied.into());
        }

        let handle_id = HandleId(self.next_handle);
        self.next_handle += 1;
        let mut handle = FileHandle::new(handle_id, id, access);
        let file = self.tree.get_mut(id)?;
        if options.append {
            handle.seek_to_end(file);
        } else if options.truncate {
            handle.truncate(file, 0)?;
        }
        self.handles.insert(handle_id, handle);

        debug!(path, handle = handle_id.as_u64(), ?access, "opened file");
        Ok(handle_id)
    }

    fn handle_and_file(&mut self, handle: HandleId) -> VfsResult<(&mut FileHandle, &mut Node)> {
        let handle = self.handles.get_mut(&handle).ok_or(VfsError::BadHandle)?;
        let file = self.tree.get_mut(handle.node())?;
        Ok((handle, file))
    }

    fn handle(&self, handle: HandleId) -> VfsResult<(&FileHandle, &Node)> {
        let handle = self.handles.get(&handle).ok_or(VfsError::BadHandle)?;
        let file = self.tree.get(handle.node())?;
        Ok((handle, file))
    }

    pub fn read(&mut self, handle: HandleId, len: usize) -> VfsResult<Vec<u8>> {
        let (handle, file) = self.handle_and_file(handle)?;
        handle.read(file, len)
    }

    pub fn write(&mut self, handle: HandleId, data: &[u8]) -> VfsResult<usize> {
        let (handle, file) = self.handle_and_file(handle)?;
        handle.write(file, data)
    }

    pub fn truncate(&mut self, handle: HandleId, size: usize) -> VfsResult<bool> {
        let (handle, file) = self.handle_and_file(handle)?;
        handle.truncate(file, size)
    }

    /// Reposition the cursor; `End` offsets are applied from the buffer length.
    pub fn seek(&mut self, handle: HandleId, pos: SeekFrom) -> VfsResult<usize> {
        let (handle, file) = self.handle_and_file(handle)?;
        let position = match pos {
            SeekFrom::Start(offset) => {
                handle.set_position(usize::try_from(offset).unwrap_or(usize::MAX));
                handle.position()
            }
            SeekFrom::Current(delta) => handle.offset_position(delta),
            SeekFrom::End(delta) => {
                handle.seek_to_end(file);
                handle.offset_position(delta)
            }
        };
        Ok(position)
    }

    pub fn tell(&self, handle: HandleId) -> VfsResult<usize> {
        Ok(self.handle(handle)?.0.position())
    }

    pub fn is_eof(&self, handle: HandleId) -> VfsResult<bool> {
        let (handle, file) = self.handle(handle)?;
        Ok(handle.is_at_eof(file))
    }

    /// Request an advisory lock on the handle's file; `Ok(false)` when denied
    pub fn lock(&mut self, handle: HandleId, operation: LockOperation) -> VfsResult<bool> {
        let (handle, file) = self.handle_and_file(handle)?;
        let handle_id = handle.id();
        let node = handle.node();
        let granted = file.locks_mut()?.request(handle_id, operation);
        if granted {
            debug!(handle = handle_id.as_u64(), node = node.as_u64(), ?operation, "lock granted");
        } else {
            warn!(handle = handle_id.as_u64(), node = node.as_u64(), ?operation, "lock conflict");
        }
        Ok(granted)
    }

    /// Drop a handle. Its advisory locks stay in place until unlocked.
    pub fn close(&mut self, handle: HandleId) -> VfsResult<()> {
        let closed = self.handles.remove(&handle).ok_or(VfsError::BadHandle)?;
        let node = closed.node();
        if !self.handles.values().any(|h| h.node() == node) {
            self.tree.discard(node);
        }
        debug!(handle = handle.as_u64(), node = node.as_u64(), "closed handle");
        Ok(())
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new(&VfsConfig::default())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("identity", &self.factory.identity())
            .field("nodes", &self.tree.len())
            .field("handles", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_normalize_separators() {
        assert_eq!(segments("/a//b\\c/"), vec!["a", "b", "c"]);
        assert!(segments("/").is_empty());
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(
            split_parent("/a/b/c"),
            Some((vec!["a".to_string(), "b".to_string()], "c".to_string()))
        );
        assert_eq!(split_parent("a"), Some((Vec::new(), "a".to_string())));
        assert_eq!(split_parent("/"), None);
        assert_eq!(join(&["a".to_string(), "b".to_string()]), "/a/b");
    }

    #[test]
    fn test_lookup_through_backslashes() {
        let mut container = Container::default();
        let id = container.create_dir("/a/b", true, None).unwrap();
        assert_eq!(container.get_node_at("\\a\\b").unwrap(), id);
        assert_eq!(container.get_node_at("/").unwrap(), NodeId::ROOT);
    }

    #[test]
    fn test_file_in_middle_of_path_is_not_found() {
        let mut container = Container::default();
        container.create_file("/f", "x").unwrap();
        assert_eq!(container.get_node_at("/f/g"), Err(VfsError::PathNotFound));
        assert_eq!(
            container.create_file("/f/g", ""),
            Err(VfsError::PathNotFound)
        );
    }

    #[test]
    fn test_create_under_file_parent_reports_not_a_directory() {
        let mut container = Container::default();
        container.create_file("/f", "x").unwrap();
        container.create_link("/l", "/f").unwrap();
        assert_eq!(
            container.create_dir("/l/d", true, None),
            Err(VfsError::PathIsNotADirectory)
        );
        assert_eq!(
            container.create_dir("/f/d/e", true, None),
            Err(VfsError::PathIsNotADirectory)
        );
    }

    #[test]
    fn test_failed_attach_leaves_no_orphans() {
        let mut container = Container::default();
        container.create_dir("/d", false, None).unwrap();
        let before = container.tree().len();
        assert_eq!(
            container.create_dir("/d", false, None),
            Err(VfsError::PathAlreadyExists)
        );
        assert_eq!(container.tree().len(), before);
    }

    #[test]
    fn test_handles_survive_unlink_until_close() {
        let mut container = Container::default();
        container.create_file("/f", "data").unwrap();
        let handle = container.open("/f", &OpenOptions::read_only()).unwrap();
        assert_eq!(container.fstat(handle).unwrap().size, 4);

        container.remove("/f", false).unwrap();
        assert!(!container.has_node_at("/f"));
        assert_eq!(container.read(handle, 10).unwrap(), b"data");

        let nodes_before_close = container.tree().len();
        container.close(handle).unwrap();
        assert_eq!(container.tree().len(), nodes_before_close - 1);
        assert_eq!(container.read(handle, 1), Err(VfsError::BadHandle));
    }

    #[test]
    fn test_debug_output() {
        let container = Container::with_identity(Identity::new(7, 8));
        let debug = format!("{:?}", container);
        assert!(debug.contains("uid: 7"));
        assert!(debug.contains("handles: 0"));
    }
}
