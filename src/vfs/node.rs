//! Virtual filesystem node types.
//!
//! Naming follows the style of the NFSv3 vfs reference: plain structs
//! over the attributes a real filesystem node would carry, with an
//! explicit `NodeKind` rather than encoding type in a bitmask.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// File content: either inline bytes (writable, session-private once
/// copied) or a reference into the immutable base image, kept separate
/// so the base image's backing bytes are never duplicated needlessly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Inline(Vec<u8>),
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VfsNode {
    pub name: String,
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub content: Content,
    /// Symlink target, only meaningful when `kind == NodeKind::Symlink`.
    pub link_target: Option<String>,
    /// Children, ordered by name for deterministic listing. Only
    /// meaningful when `kind == NodeKind::Directory`.
    pub children: BTreeMap<String, VfsNode>,
}

impl VfsNode {
    pub fn root() -> Self {
        VfsNode::dir("", 0o755)
    }

    pub fn dir(name: impl Into<String>, mode: u32) -> Self {
        VfsNode {
            name: name.into(),
            kind: NodeKind::Directory,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            content: Content::Absent,
            link_target: None,
            children: BTreeMap::new(),
        }
    }

    pub fn file(name: impl Into<String>, mode: u32, bytes: Vec<u8>) -> Self {
        VfsNode {
            name: name.into(),
            kind: NodeKind::File,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            content: Content::Inline(bytes),
            link_target: None,
            children: BTreeMap::new(),
        }
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        VfsNode {
            name: name.into(),
            kind: NodeKind::Symlink,
            mode: 0o777,
            uid: 0,
            gid: 0,
            mtime: 0,
            content: Content::Absent,
            link_target: Some(target.into()),
            children: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> u64 {
        match &self.content {
            Content::Inline(bytes) => bytes.len() as u64,
            Content::Absent => 0,
        }
    }

    pub fn insert_child(&mut self, child: VfsNode) {
        self.children.insert(child.name.clone(), child);
    }
}
