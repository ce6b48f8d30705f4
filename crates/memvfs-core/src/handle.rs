// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open file handle: a cursor over one File node's buffer
//!
//! Reads and writes on a handle opened without the matching capability
//! transfer nothing instead of failing.

use crate::error::VfsResult;
use crate::node::Node;
use crate::types::current_timestamp;
use crate::{HandleId, NodeId};

/// Capabilities granted when the handle was opened
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

impl Access {
    pub const READ_ONLY: Access = Access {
        read: true,
        write: false,
    };
    pub const WRITE_ONLY: Access = Access {
        read: false,
        write: true,
    };
    pub const READ_WRITE: Access = Access {
        read: true,
        write: true,
    };
}

#[derive(Clone, Debug)]
pub struct FileHandle {
    id: HandleId,
    node: NodeId,
    position: usize,
    access: Access,
}

impl FileHandle {
    pub fn new(id: HandleId, node: NodeId, access: Access) -> Self {
        Self {
            id,
            node,
            position: 0,
            access,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Copy up to `len` bytes from the cursor, advancing it by what was returned.
    pub fn read(&mut self, file: &mut Node, len: usize) -> VfsResult<Vec<u8>> {
        if !self.access.read {
            return Ok(Vec::new());
        }
        let data = file.buffer_mut()?;
        let start = self.position.min(data.len());
        let end = start.saturating_add(len).min(data.len());
        let chunk = data[start..end].to_vec();
        self.position = self.position.saturating_add(len).min(data.len());
        file.times.atime = current_timestamp();
        Ok(chunk)
    }

    /// Keep the buffer up to the cursor, drop the tail and append `bytes`.
    pub fn write(&mut self, file: &mut Node, bytes: &[u8]) -> VfsResult<usize> {
        if !self.access.write {
            return Ok(0);
        }
        let data = file.buffer_mut()?;
        data.truncate(self.position);
        data.extend_from_slice(bytes);
        self.position = self.position.saturating_add(bytes.len());

        let now = current_timestamp();
        file.times.mtime = now;
        file.times.ctime = now;
        Ok(bytes.len())
    }

    /// Clip the buffer to `size` bytes and rewind. Never pads.
    pub fn truncate(&mut self, file: &mut Node, size: usize) -> VfsResult<bool> {
        if !self.access.write {
            return Ok(false);
        }
        file.buffer_mut()?.truncate(size);
        self.position = 0;

        let now = current_timestamp();
        file.times.mtime = now;
        file.times.ctime = now;
        Ok(true)
    }

    pub fn seek_to_end(&mut self, file: &Node) -> usize {
        self.position = file.data().map_or(0, <[u8]>::len);
        self.position
    }

    pub fn offset_position(&mut self, delta: i64) -> usize {
        self.position = self.position.saturating_add_signed(delta as isize);
        self.position
    }

    pub fn is_at_eof(&self, file: &Node) -> bool {
        self.position >= file.data().map_or(0, <[u8]>::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Identity;

    fn file(content: &[u8]) -> Node {
        Node::file("f", Identity::root(), 0o644, 0, content.to_vec())
    }

    fn handle(access: Access) -> FileHandle {
        FileHandle::new(HandleId(1), NodeId(5), access)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut node = file(b"");
        let mut h = handle(Access::READ_WRITE);
        assert_eq!(h.write(&mut node, b"hello world").unwrap(), 11);
        h.set_position(0);
        assert_eq!(h.read(&mut node, 11).unwrap(), b"hello world");
        assert!(h.is_at_eof(&node));
        assert!(node.times().mtime > 0);
    }

    #[test]
    fn test_write_discards_tail_after_cursor() {
        let mut node = file(b"0123456789");
        let mut h = handle(Access::READ_WRITE);
        h.set_position(3);
        h.write(&mut node, b"ab").unwrap();
        assert_eq!(node.data().unwrap(), b"012ab");
        assert_eq!(h.position(), 5);
    }

    #[test]
    fn test_write_past_end_does_not_pad() {
        let mut node = file(b"abc");
        let mut h = handle(Access::WRITE_ONLY);
        h.set_position(10);
        h.write(&mut node, b"d").unwrap();
        assert_eq!(node.data().unwrap(), b"abcd");
    }

    #[test]
    fn test_read_clamps_to_buffer() {
        let mut node = file(b"abc");
        let mut h = handle(Access::READ_ONLY);
        h.set_position(1);
        assert_eq!(h.read(&mut node, 100).unwrap(), b"bc");
        assert_eq!(h.position(), 3);
        assert!(h.read(&mut node, 5).unwrap().is_empty());
    }

    #[test]
    fn test_truncate_clips_and_rewinds() {
        let mut node = file(b"abcdef");
        let mut h = handle(Access::READ_WRITE);
        h.seek_to_end(&node);
        assert!(h.truncate(&mut node, 2).unwrap());
        assert_eq!(node.data().unwrap(), b"ab");
        assert_eq!(h.position(), 0);

        assert!(h.truncate(&mut node, 10).unwrap());
        assert_eq!(node.data().unwrap(), b"ab");

        assert!(h.truncate(&mut node, 0).unwrap());
        assert!(h.read(&mut node, 10).unwrap().is_empty());
    }

    #[test]
    fn test_capability_gating_is_silent() {
        let mut node = file(b"abc");
        let mut reader = handle(Access::READ_ONLY);
        assert_eq!(reader.write(&mut node, b"zzz").unwrap(), 0);
        assert!(!reader.truncate(&mut node, 0).unwrap());
        assert_eq!(node.data().unwrap(), b"abc");

        let mut writer = handle(Access::WRITE_ONLY);
        assert!(writer.read(&mut node, 3).unwrap().is_empty());
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn test_offset_position() {
        let node = file(b"abcdef");
        let mut h = handle(Access::READ_ONLY);
        h.offset_position(4);
        h.offset_position(-1);
        assert_eq!(h.position(), 3);
        assert!(!h.is_at_eof(&node));
        assert_eq!(h.seek_to_end(&node), 6);
        assert!(h.is_at_eof(&node));
    }
}
