//! Virtual filesystem (C1): path resolution, wildcard expansion, and a
//! per-session copy-on-write overlay atop a shared, immutable base image.
//!
//! Grounded on the attribute shape of `other_examples`' NFSv3 vfs trait
//! (`NfsError`/`FileAttr`) and on the semantics spec.md §4.1 describes for
//! the original Python `fs.py`. The overlay itself follows the redesign
//! note in SPEC_FULL.md §9: a base pointer plus a COW dictionary of shadow
//! entries keyed by absolute path, not a physical clone of the tree.

pub mod node;

use std::{collections::BTreeSet, sync::Arc};

pub use node::{Content, NodeKind, VfsNode};

/// Failure kinds surfaced by vfs operations. Never shown verbatim to the
/// attacker; individual commands translate these into bash-flavored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    NotADirectory,
    IsADirectory,
    PermissionDenied,
    Loop,
    InvalidPath,
    AlreadyExists,
}

impl std::fmt::Display for VfsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VfsError::NotFound => "no such file or directory",
            VfsError::NotADirectory => "not a directory",
            VfsError::IsADirectory => "is a directory",
            VfsError::PermissionDenied => "permission denied",
            VfsError::Loop => "too many levels of symbolic links",
            VfsError::InvalidPath => "invalid argument",
            VfsError::AlreadyExists => "file exists",
        };
        f.write_str(s)
    }
}

impl std::error::Error for VfsError {}

/// A patch entry in the overlay, keyed by normalized absolute path.
#[derive(Debug, Clone)]
enum OverlayEntry {
    /// The node at this path is replaced wholesale with `VfsNode`. Its own
    /// `children` field is never consulted for directory listings — only
    /// for the handful of accessors (`size`, `content`) that don't need to
    /// know about other overlay entries.
    Node(VfsNode),
    /// The node at this path (base or otherwise) no longer exists.
    Tombstone,
}

/// A read-only view of a node, whichever layer it was found in.
#[derive(Debug, Clone)]
pub struct NodeView {
    pub node: VfsNode,
}

impl std::ops::Deref for NodeView {
    type Target = VfsNode;
    fn deref(&self) -> &VfsNode {
        &self.node
    }
}

/// The shared, immutable ground-truth tree loaded once at startup.
pub struct VfsImage {
    root: VfsNode,
}

impl VfsImage {
    pub fn new(root: VfsNode) -> Arc<Self> {
        Arc::new(VfsImage { root })
    }

    /// Loads a `bincode`-encoded `VfsNode` tree from `path`.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Arc<Self>> {
        use anyhow::Context;
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading vfs image '{}'", path.display()))?;
        let root: VfsNode = bincode::deserialize(&bytes)
            .with_context(|| format!("decoding vfs image '{}'", path.display()))?;
        Ok(Self::new(root))
    }

    /// A tiny built-in image (`/`, `/root`, `/bin`, `/tmp`, `/etc`) so the
    /// daemon has something plausible to show even with no
    /// `filesystem_file` configured.
    pub fn minimal() -> Arc<Self> {
        let mut root = VfsNode::root();
        let mut root_home = VfsNode::dir("root", 0o700);
        root_home.insert_child(VfsNode::file(
            ".bash_history",
            0o600,
            Vec::new(),
        ));
        root.insert_child(root_home);
        root.insert_child(VfsNode::dir("bin", 0o755));
        root.insert_child(VfsNode::dir("usr", 0o755));
        root.insert_child(VfsNode::dir("sbin", 0o755));
        root.insert_child(VfsNode::dir("tmp", 0o1777));
        let mut etc = VfsNode::dir("etc", 0o755);
        etc.insert_child(VfsNode::file(
            "passwd",
            0o644,
            b"root:x:0:0:root:/root:/bin/bash\n".to_vec(),
        ));
        etc.insert_child(VfsNode::file("hostname", 0o644, b"svr03\n".to_vec()));
        root.insert_child(etc);
        Self::new(root)
    }
}

/// Per-session logical copy of the base image: an overlay of shadow
/// entries, created in O(1) and discarded wholesale at disconnect.
pub struct Vfs {
    base: Arc<VfsImage>,
    overlay: std::collections::HashMap<String, OverlayEntry>,
}

impl Vfs {
    pub fn new(base: Arc<VfsImage>) -> Self {
        Vfs { base, overlay: std::collections::HashMap::new() }
    }

    /// Normalizes `path` against `cwd`, resolving `.`, `..`, duplicate
    /// separators, and symlinks encountered along the way. Does not
    /// require the final component to exist.
    pub fn resolve_path(&self, path: &str, cwd: &str) -> Result<String, VfsError> {
        if path.is_empty() {
            return Err(VfsError::InvalidPath);
        }
        let mut resolved: Vec<String> = if path.starts_with('/') {
            Vec::new()
        } else {
            split_segments(cwd)
        };
        let mut pending: std::collections::VecDeque<String> = split_segments(path).into();
        let mut symlink_hops = 0usize;

        while let Some(seg) = pending.pop_front() {
            match seg.as_str() {
                "." => continue,
                ".." => {
                    resolved.pop();
                }
                _ => {
                    resolved.push(seg);
                    let here = join_segments(&resolved);
                    if let Some(view) = self.lookup_exact(&here) {
                        if view.kind == NodeKind::Symlink {
                            symlink_hops += 1;
                            if symlink_hops > crate::consts::MAX_SYMLINK_DEPTH {
                                return Err(VfsError::Loop);
                            }
                            resolved.pop();
                            let target = view.link_target.clone().unwrap_or_default();
                            let target_segments = split_segments(&target);
                            if target.starts_with('/') {
                                resolved = Vec::new();
                            }
                            for (i, s) in target_segments.into_iter().enumerate() {
                                pending.insert(i, s);
                            }
                        }
                    }
                }
            }
        }
        Ok(join_segments(&resolved))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup_exact(path).is_some()
    }

    /// Expands a single argument containing `*`, `?`, or `[set]` against
    /// the directory holding its final path segment. Returns matches in
    /// lexicographic order, or an empty vec if the argument has no
    /// wildcard characters or nothing matched.
    pub fn resolve_path_wc(&self, arg: &str, cwd: &str) -> Vec<String> {
        if !has_wildcard(arg) {
            return Vec::new();
        }
        let (dir_part, pattern) = match arg.rfind('/') {
            Some(idx) => (&arg[..=idx], &arg[idx + 1..]),
            None => ("", arg),
        };
        let lookup_dir = if dir_part.is_empty() { cwd.to_string() } else { dir_part.to_string() };
        let abs_dir = match self.resolve_path(&lookup_dir, cwd) {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };
        let Ok(entries) = self.list_dir(&abs_dir) else { return Vec::new() };

        let mut matches: Vec<String> = entries
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| {
                if name.starts_with('.') && !pattern.starts_with('.') {
                    return false;
                }
                glob_match(pattern, name)
            })
            .collect();
        matches.sort();
        matches.into_iter().map(|name| format!("{}{}", dir_part, name)).collect()
    }

    pub fn get_node(&self, path: &str) -> Result<NodeView, VfsError> {
        self.lookup_exact(path).ok_or(VfsError::NotFound)
    }

    pub fn stat(&self, path: &str) -> Result<NodeView, VfsError> {
        self.get_node(path)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<(String, NodeView)>, VfsError> {
        let dir = self.get_node(path)?;
        if dir.kind != NodeKind::Directory {
            return Err(VfsError::NotADirectory);
        }

        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(base_node) = self.lookup_base_only(path) {
            if base_node.kind == NodeKind::Directory {
                names.extend(base_node.children.keys().cloned());
            }
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        for key in self.overlay.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    names.insert(rest.to_string());
                }
            }
        }

        let mut out = Vec::new();
        for name in names {
            let child_path = if path == "/" { format!("/{}", name) } else { format!("{}/{}", path, name) };
            if matches!(self.overlay.get(&child_path), Some(OverlayEntry::Tombstone)) {
                continue;
            }
            if let Some(view) = self.lookup_exact(&child_path) {
                out.push((name, view));
            }
        }
        Ok(out)
    }

    pub fn read_file(&self, path: &str, offset: usize, len: Option<usize>) -> Result<Vec<u8>, VfsError> {
        let node = self.get_node(path)?;
        if node.kind == NodeKind::Directory {
            return Err(VfsError::IsADirectory);
        }
        let bytes = match &node.content {
            Content::Inline(bytes) => bytes.clone(),
            Content::Absent => Vec::new(),
        };
        let offset = offset.min(bytes.len());
        let end = match len {
            Some(len) => (offset + len).min(bytes.len()),
            None => bytes.len(),
        };
        Ok(bytes[offset..end].to_vec())
    }

    pub fn write_file(&mut self, path: &str, bytes: &[u8], truncate: bool) -> Result<(), VfsError> {
        let existing = self.lookup_exact(path);
        if matches!(&existing, Some(n) if n.kind == NodeKind::Directory) {
            return Err(VfsError::IsADirectory);
        }
        let name = last_segment(path)?;
        let mut content = if truncate {
            Vec::new()
        } else {
            existing
                .and_then(|n| match n.node.content {
                    Content::Inline(bytes) => Some(bytes),
                    Content::Absent => None,
                })
                .unwrap_or_default()
        };
        content.extend_from_slice(bytes);
        let node = VfsNode::file(name, 0o644, content);
        self.overlay.insert(path.to_string(), OverlayEntry::Node(node));
        Ok(())
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), VfsError> {
        if self.exists(path) {
            return Err(VfsError::AlreadyExists);
        }
        let parent = parent_path(path);
        let parent_node = self.get_node(&parent)?;
        if parent_node.kind != NodeKind::Directory {
            return Err(VfsError::NotADirectory);
        }
        let name = last_segment(path)?;
        self.overlay.insert(path.to_string(), OverlayEntry::Node(VfsNode::dir(name, 0o755)));
        Ok(())
    }

    pub fn unlink(&mut self, path: &str) -> Result<(), VfsError> {
        if path == "/" {
            return Err(VfsError::PermissionDenied);
        }
        if !self.exists(path) {
            return Err(VfsError::NotFound);
        }
        self.overlay.insert(path.to_string(), OverlayEntry::Tombstone);
        Ok(())
    }

    /// Overlay-aware lookup: exact overlay hit wins, otherwise descend the
    /// immutable base tree component by component.
    fn lookup_exact(&self, abs_path: &str) -> Option<NodeView> {
        if let Some(entry) = self.overlay.get(abs_path) {
            return match entry {
                OverlayEntry::Node(n) => Some(NodeView { node: n.clone() }),
                OverlayEntry::Tombstone => None,
            };
        }
        self.lookup_base_only(abs_path).map(|n| NodeView { node: n.clone() })
    }

    fn lookup_base_only(&self, abs_path: &str) -> Option<&VfsNode> {
        let mut node = &self.base.root;
        if abs_path == "/" {
            return Some(node);
        }
        for seg in split_segments(abs_path) {
            node = node.children.get(&seg)?;
        }
        Some(node)
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn join_segments(segments: &[String]) -> String {
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn parent_path(path: &str) -> String {
    let segs = split_segments(path);
    if segs.len() <= 1 {
        "/".to_string()
    } else {
        join_segments(&segs[..segs.len() - 1])
    }
}

fn last_segment(path: &str) -> Result<String, VfsError> {
    split_segments(path).last().cloned().ok_or(VfsError::InvalidPath)
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Minimal shell-style glob matcher for a single path segment: `*` (any
/// run, not crossing this segment's boundary since it never sees `/`),
/// `?` (one char), `[set]` (a bracketed character class, `!`/`^` negates).
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    match_from(&p, 0, &n, 0)
}

fn match_from(p: &[char], pi: usize, n: &[char], ni: usize) -> bool {
    if pi == p.len() {
        return ni == n.len();
    }
    match p[pi] {
        '*' => {
            for skip in 0..=(n.len() - ni) {
                if match_from(p, pi + 1, n, ni + skip) {
                    return true;
                }
            }
            false
        }
        '?' => ni < n.len() && match_from(p, pi + 1, n, ni + 1),
        '[' => {
            let Some(close) = p[pi..].iter().position(|&c| c == ']') else {
                return ni < n.len() && p[pi] == n[ni] && match_from(p, pi + 1, n, ni + 1);
            };
            if ni >= n.len() {
                return false;
            }
            let mut set = &p[pi + 1..pi + close];
            let negate = matches!(set.first(), Some('!') | Some('^'));
            if negate {
                set = &set[1..];
            }
            let hit = set.contains(&n[ni]);
            if hit != negate {
                match_from(p, pi + close + 1, n, ni + 1)
            } else {
                false
            }
        }
        c => ni < n.len() && n[ni] == c && match_from(p, pi + 1, n, ni + 1),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_vfs() -> Vfs {
        let mut root = VfsNode::root();
        let mut tmp = VfsNode::dir("tmp", 0o1777);
        tmp.insert_child(VfsNode::file("a.txt", 0o644, b"a".to_vec()));
        tmp.insert_child(VfsNode::file("b.txt", 0o644, b"b".to_vec()));
        tmp.insert_child(VfsNode::file(".hidden", 0o644, b"h".to_vec()));
        root.insert_child(tmp);
        let mut home = VfsNode::dir("root", 0o700);
        home.insert_child(VfsNode::symlink("link-to-tmp", "/tmp"));
        root.insert_child(home);
        Vfs::new(VfsImage::new(root))
    }

    #[test]
    fn resolve_path_normalizes_dot_and_dotdot() {
        let vfs = sample_vfs();
        assert_eq!(vfs.resolve_path("..", "/tmp").unwrap(), "/");
        assert_eq!(vfs.resolve_path(".", "/tmp").unwrap(), "/tmp");
        assert_eq!(vfs.resolve_path("../tmp/./a.txt", "/root").unwrap(), "/tmp/a.txt");
    }

    #[test]
    fn resolve_path_is_idempotent() {
        let vfs = sample_vfs();
        let once = vfs.resolve_path("../tmp/a.txt", "/root").unwrap();
        let twice = vfs.resolve_path(&once, "/anywhere/else").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn resolve_path_follows_symlinks() {
        let vfs = sample_vfs();
        assert_eq!(vfs.resolve_path("link-to-tmp/a.txt", "/root").unwrap(), "/tmp/a.txt");
    }

    #[test]
    fn wildcard_expands_in_lexicographic_order_and_skips_dotfiles() {
        let vfs = sample_vfs();
        let matches = vfs.resolve_path_wc("/tmp/*", "/");
        assert_eq!(matches, vec!["/tmp/a.txt".to_string(), "/tmp/b.txt".to_string()]);
    }

    #[test]
    fn wildcard_on_empty_directory_returns_empty() {
        let vfs = sample_vfs();
        assert!(vfs.resolve_path_wc("/nonexistent/*", "/").is_empty());
    }

    #[test]
    fn literal_argument_is_not_a_wildcard() {
        let vfs = sample_vfs();
        assert!(vfs.resolve_path_wc("/tmp/a.txt", "/").is_empty());
    }

    #[test]
    fn write_then_read_overlay_roundtrips() {
        let mut vfs = sample_vfs();
        vfs.write_file("/tmp/new.txt", b"hello", true).unwrap();
        assert_eq!(vfs.read_file("/tmp/new.txt", 0, None).unwrap(), b"hello");
        assert!(vfs.list_dir("/tmp").unwrap().iter().any(|(n, _)| n == "new.txt"));
    }

    #[test]
    fn unlink_hides_base_file_without_mutating_base() {
        let mut vfs = sample_vfs();
        vfs.unlink("/tmp/a.txt").unwrap();
        assert!(!vfs.exists("/tmp/a.txt"));

        let fresh = sample_vfs();
        assert!(fresh.exists("/tmp/a.txt"));
    }

    #[test]
    fn mkdir_rejects_existing_path() {
        let mut vfs = sample_vfs();
        assert_eq!(vfs.mkdir("/tmp").unwrap_err(), VfsError::AlreadyExists);
    }

    #[test]
    fn two_sessions_are_independent() {
        let image = VfsImage::minimal();
        let mut a = Vfs::new(image.clone());
        let b = Vfs::new(image);
        a.write_file("/root/only-in-a.txt", b"x", true).unwrap();
        assert!(a.exists("/root/only-in-a.txt"));
        assert!(!b.exists("/root/only-in-a.txt"));
    }
}
