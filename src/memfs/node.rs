//! Node Tree
//!
//! Pure in-memory tree backing [`MemFs`](super::MemFs). Children of a
//! directory are kept in a `Vec` sorted by name, so lookup, insert and
//! removal are binary searches.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::tier::{DirEntry, FileMode, Metadata};

/// A file or directory
#[derive(Debug, Clone)]
pub(crate) struct Node {
    name: String,
    /// `None` until the file is written
    content: Option<Bytes>,
    modified: DateTime<Utc>,
    is_dir: bool,
    mode: FileMode,
    /// Sorted by name; always empty for files
    children: Vec<Node>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self::dir(".")
    }

    pub(crate) fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: None,
            modified: Utc::now(),
            is_dir: true,
            mode: FileMode::DIR,
            children: Vec::new(),
        }
    }

    pub(crate) fn file(name: &str, content: Option<Bytes>, mode: FileMode) -> Self {
        Self {
            name: name.to_string(),
            content,
            modified: Utc::now(),
            is_dir: false,
            mode,
            children: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// File content; empty for unwritten files and directories
    pub(crate) fn content(&self) -> Bytes {
        self.content.clone().unwrap_or_default()
    }

    pub(crate) fn set_content(&mut self, content: Bytes) {
        self.content = Some(content);
        self.modified = Utc::now();
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn metadata(&self) -> Metadata {
        Metadata {
            name: self.name.clone(),
            size: self.content.as_ref().map_or(0, |c| c.len() as u64),
            modified: self.modified,
            is_dir: self.is_dir,
            mode: self.mode,
        }
    }

    pub(crate) fn entries(&self) -> Vec<DirEntry> {
        self.children
            .iter()
            .map(|c| DirEntry {
                name: c.name.clone(),
                is_dir: c.is_dir,
            })
            .collect()
    }

    #[inline]
    fn position(&self, name: &str) -> std::result::Result<usize, usize> {
        self.children
            .binary_search_by(|c| c.name.as_str().cmp(name))
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Node> {
        self.position(name).ok().map(|i| &self.children[i])
    }

    /// Walk `segments` from this node
    pub(crate) fn find(&self, segments: &[&str]) -> Option<&Node> {
        let mut node = self;
        for seg in segments {
            node = node.child(seg)?;
        }
        Some(node)
    }

    pub(crate) fn find_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        match segments.split_first() {
            None => Some(self),
            Some((first, rest)) => {
                let idx = self.position(first).ok()?;
                self.children[idx].find_mut(rest)
            }
        }
    }

    /// Walk `segments`, creating missing directories. On failure returns the
    /// index of the segment that exists but is not a directory.
    pub(crate) fn ensure_dirs(&mut self, segments: &[&str]) -> std::result::Result<&mut Node, usize> {
        self.ensure_dirs_from(segments, 0)
    }

    fn ensure_dirs_from(
        &mut self,
        segments: &[&str],
        depth: usize,
    ) -> std::result::Result<&mut Node, usize> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(self);
        };
        let idx = match self.position(first) {
            Ok(i) if self.children[i].is_dir => i,
            Ok(_) => return Err(depth),
            Err(i) => {
                self.children.insert(i, Node::dir(first));
                i
            }
        };
        self.children[idx].ensure_dirs_from(rest, depth + 1)
    }

    /// Insert a child in sorted position. Hands the node back if the name is
    /// taken or this node is not a directory.
    pub(crate) fn insert(&mut self, node: Node) -> std::result::Result<&mut Node, Node> {
        if !self.is_dir {
            return Err(node);
        }
        match self.position(&node.name) {
            Ok(_) => Err(node),
            Err(i) => {
                self.children.insert(i, node);
                Ok(&mut self.children[i])
            }
        }
    }

    /// Detach a child, returning it
    pub(crate) fn detach(&mut self, name: &str) -> Option<Node> {
        let idx = self.position(name).ok()?;
        Some(self.children.remove(idx))
    }

    /// Number of files at or below this node
    pub(crate) fn file_count(&self) -> usize {
        if !self.is_dir {
            return 1;
        }
        self.children.iter().map(Node::file_count).sum()
    }

    /// Visit every file below this node with its full slash-joined path
    pub(crate) fn walk_files<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, &'a Node)) {
        for child in &self.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", prefix, child.name)
            };
            if child.is_dir {
                child.walk_files(&path, visit);
            } else {
                visit(path, child);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(node: &Node) -> Vec<String> {
        node.entries().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_children_stay_sorted() {
        let mut root = Node::root();
        for name in ["m", "c", "x", "a", "k"] {
            assert!(root.insert(Node::file(name, None, FileMode::DEFAULT)).is_ok());
        }
        assert_eq!(names(&root), vec!["a", "c", "k", "m", "x"]);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut root = Node::root();
        assert!(root.insert(Node::dir("a")).is_ok());
        let back = root.insert(Node::file("a", None, FileMode::DEFAULT));
        assert!(back.is_err());
        assert!(root.child("a").unwrap().is_dir());
    }

    #[test]
    fn test_file_cannot_have_children() {
        let mut file = Node::file("f", Some(Bytes::from("x")), FileMode::DEFAULT);
        assert!(file.insert(Node::dir("d")).is_err());
        assert!(!file.has_children());
    }

    #[test]
    fn test_ensure_dirs_creates_and_reuses() {
        let mut root = Node::root();
        root.ensure_dirs(&["a", "b"]).unwrap();
        root.ensure_dirs(&["a", "c"]).unwrap();

        let a = root.find(&["a"]).unwrap();
        assert!(a.is_dir());
        assert_eq!(names(a), vec!["b", "c"]);
    }

    #[test]
    fn test_ensure_dirs_through_file_fails() {
        let mut root = Node::root();
        let a = root.ensure_dirs(&["a"]).unwrap();
        a.insert(Node::file("f", None, FileMode::DEFAULT)).unwrap();

        assert_eq!(root.ensure_dirs(&["a", "f", "g"]).err(), Some(1));
    }

    #[test]
    fn test_detach_and_counts() {
        let mut root = Node::root();
        let d = root.ensure_dirs(&["d"]).unwrap();
        d.insert(Node::file("1", None, FileMode::DEFAULT)).unwrap();
        d.insert(Node::file("2", None, FileMode::DEFAULT)).unwrap();
        root.insert(Node::file("top", None, FileMode::DEFAULT)).unwrap();
        assert_eq!(root.file_count(), 3);

        let detached = root.detach("d").unwrap();
        assert_eq!(detached.file_count(), 2);
        assert_eq!(root.file_count(), 1);
        assert!(root.detach("d").is_none());
    }

    #[test]
    fn test_unwritten_file_is_empty() {
        let node = Node::file("f", None, FileMode::DEFAULT);
        assert!(node.content().is_empty());
        assert_eq!(node.metadata().size, 0);
    }

    #[test]
    fn test_walk_files_full_paths() {
        let mut root = Node::root();
        root.ensure_dirs(&["a", "b"])
            .unwrap()
            .insert(Node::file("deep", None, FileMode::DEFAULT))
            .unwrap();
        root.insert(Node::file("top", None, FileMode::DEFAULT)).unwrap();

        let mut seen = Vec::new();
        root.walk_files("", &mut |path, _| seen.push(path));
        assert_eq!(seen, vec!["a/b/deep", "top"]);
    }
}
