//! In-memory filesystem tier

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, error};

use super::file::{MemFile, MemWriter};
use super::node::Node;
use super::pearson;
use crate::error::{Error, Result};
use crate::tier::{DirEntry, FileHandle, FileMode, Metadata, OpenOptions, Tier};

/// Memory filesystem configuration
#[derive(Debug, Clone)]
pub struct MemFsConfig {
    /// Build a hashed slot table on freeze and resolve reads through it
    pub hashed_lookup: bool,
    /// Name reported in logs and fill attribution
    pub label: String,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            hashed_lookup: false,
            label: "memfs".to_string(),
        }
    }
}

/// Write-once, slash-delimited in-memory filesystem.
///
/// Writes auto-create parent directories and never overwrite. After
/// [`freeze`](MemFs::freeze) every mutation fails with [`Error::ReadOnly`].
/// Reads share a read lock and writes are serialized by the write lock.
pub struct MemFs {
    shared: Arc<Shared>,
}

struct Tree {
    root: Node,
    files: usize,
    frozen: bool,
}

pub(crate) struct Shared {
    config: MemFsConfig,
    tree: RwLock<Tree>,
    /// Set once, on freeze, when hashed lookup is enabled
    slots: OnceLock<SlotTable>,
}

struct Slot {
    path: String,
    meta: Metadata,
    content: Bytes,
}

/// Fixed-size table indexed by `pearson64(path) % len`.
///
/// A slot keeps the first path hashed to it; later colliding paths are not
/// chained and resolve through the tree instead.
struct SlotTable {
    slots: Vec<Option<Slot>>,
    collisions: usize,
    unhashable: usize,
}

impl SlotTable {
    fn build(root: &Node, files: usize) -> Self {
        let mut slots: Vec<Option<Slot>> = (0..files).map(|_| None).collect();
        let mut collisions = 0;
        let mut unhashable = 0;

        root.walk_files("", &mut |path, node| match pearson::slot(&path, slots.len()) {
            None => unhashable += 1,
            Some(i) if slots[i].is_some() => collisions += 1,
            Some(i) => {
                slots[i] = Some(Slot {
                    meta: node.metadata(),
                    content: node.content(),
                    path,
                });
            }
        });

        Self {
            slots,
            collisions,
            unhashable,
        }
    }

    fn lookup(&self, path: &str) -> Option<&Slot> {
        let i = pearson::slot(path, self.slots.len())?;
        self.slots[i].as_ref().filter(|s| s.path == path)
    }
}

/// Strip leading `./` and `/` prefixes
fn clean(name: &str) -> &str {
    let mut n = name;
    loop {
        if let Some(rest) = n.strip_prefix("./") {
            n = rest;
        } else if let Some(rest) = n.strip_prefix('/') {
            n = rest;
        } else {
            break;
        }
    }
    if n == "." {
        ""
    } else {
        n
    }
}

/// Split a path into segments; an empty result is the root
fn segments(name: &str) -> Result<Vec<&str>> {
    let cleaned = clean(name).trim_end_matches('/');
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }
    let segs: Vec<&str> = cleaned.split('/').collect();
    if segs.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
        return Err(Error::invalid_path(name, "empty, '.' or '..' path element"));
    }
    Ok(segs)
}

/// Segments of a path that must name a file
fn file_segments(name: &str) -> Result<Vec<&str>> {
    if clean(name).ends_with('/') {
        return Err(Error::invalid_path(name, "cannot write a directory path"));
    }
    let segs = segments(name)?;
    if segs.is_empty() {
        return Err(Error::invalid_path(name, "cannot write to the root"));
    }
    Ok(segs)
}

fn not_a_directory(name: &str, segs: &[&str], i: usize) -> Error {
    Error::invalid_path(
        name,
        format!("element {} ({}) is not a directory", i, segs[i]),
    )
}

impl Shared {
    /// Resolve a file or directory, via the slot table when frozen and hashed
    fn lookup(&self, name: &str) -> Result<(Metadata, Bytes)> {
        let segs = segments(name)?;

        if let Some(table) = self.slots.get() {
            if let Some(slot) = table.lookup(&segs.join("/")) {
                return Ok((slot.meta.clone(), slot.content.clone()));
            }
        }

        let tree = self.tree.read();
        let node = tree
            .root
            .find(&segs)
            .ok_or_else(|| Error::not_found(name))?;
        Ok((node.metadata(), node.content()))
    }

    fn insert_file(&self, name: &str, content: Option<Bytes>, mode: FileMode) -> Result<()> {
        let segs = file_segments(name)?;
        let Some((leaf, parents)) = segs.split_last() else {
            return Err(Error::invalid_path(name, "cannot write to the root"));
        };

        let mut guard = self.tree.write();
        let tree = &mut *guard;
        if tree.frozen {
            return Err(Error::read_only(name));
        }

        let dir = tree
            .root
            .ensure_dirs(parents)
            .map_err(|i| not_a_directory(name, parents, i))?;
        dir.insert(Node::file(leaf, content, mode))
            .map_err(|_| Error::already_exists(name))?;
        tree.files += 1;
        Ok(())
    }

    /// Replace a file's content; used when a write handle is shut down
    pub(crate) fn publish(&self, name: &str, content: Bytes) -> Result<()> {
        let segs = segments(name)?;
        let mut tree = self.tree.write();
        if tree.frozen {
            return Err(Error::read_only(name));
        }
        match tree.root.find_mut(&segs) {
            Some(node) if !node.is_dir() => {
                node.set_content(content);
                Ok(())
            }
            Some(_) => Err(Error::invalid_path(name, "is a directory")),
            None => Err(Error::not_found(name)),
        }
    }

    fn mkdir_all(&self, path: &str) -> Result<()> {
        let segs = segments(path)?;
        let mut tree = self.tree.write();
        if tree.frozen {
            return Err(Error::read_only(path));
        }
        tree.root
            .ensure_dirs(&segs)
            .map(|_| ())
            .map_err(|i| not_a_directory(path, &segs, i))
    }

    fn remove(&self, name: &str, recursive: bool) -> Result<()> {
        let segs = segments(name)?;
        let Some((leaf, parents)) = segs.split_last() else {
            return Err(Error::invalid_path(name, "cannot remove the root directory"));
        };
        let missing = || {
            if recursive {
                Ok(())
            } else {
                Err(Error::not_found(name))
            }
        };

        let mut guard = self.tree.write();
        let tree = &mut *guard;
        if tree.frozen {
            return Err(Error::read_only(name));
        }

        let parent = match tree.root.find_mut(parents) {
            Some(p) if p.is_dir() => p,
            Some(_) => return Err(Error::invalid_path(name, "parent is not a directory")),
            None => return missing(),
        };
        let Some(target) = parent.child(leaf) else {
            return missing();
        };
        if !recursive && target.is_dir() && target.has_children() {
            return Err(Error::invalid_path(name, "directory not empty"));
        }

        let removed = parent.detach(leaf).map_or(0, |n| n.file_count());
        tree.files -= removed;
        debug!(path = %name, files = removed, "removed from memfs");
        Ok(())
    }

    fn open_writer(self: &Arc<Self>, name: &str, mode: FileMode, options: OpenOptions) -> Result<MemWriter> {
        let segs = file_segments(name)?;
        let mut guard = self.tree.write();
        let tree = &mut *guard;
        if tree.frozen {
            return Err(Error::read_only(name));
        }

        let existing = tree.root.find(&segs).map(|n| (n.is_dir(), n.content()));
        let initial = match existing {
            Some((true, _)) => return Err(Error::invalid_path(name, "is a directory")),
            Some(_) if options.exclusive => return Err(Error::already_exists(name)),
            Some((false, content)) if options.append && !options.truncate => content.to_vec(),
            Some(_) => Vec::new(),
            None if !options.create => return Err(Error::not_found(name)),
            None => {
                let Some((leaf, parents)) = segs.split_last() else {
                    return Err(Error::invalid_path(name, "cannot write to the root"));
                };
                let dir = tree
                    .root
                    .ensure_dirs(parents)
                    .map_err(|i| not_a_directory(name, parents, i))?;
                if dir.insert(Node::file(leaf, None, mode)).is_err() {
                    error!(path = %name, "memfs entry appeared under the write lock");
                    return Err(Error::Invariant(format!(
                        "{} appeared in memfs while holding the write lock",
                        name
                    )));
                }
                tree.files += 1;
                Vec::new()
            }
        };

        Ok(MemWriter::new(Arc::clone(self), name.to_string(), initial))
    }
}

impl MemFs {
    /// Create an empty filesystem with default configuration
    pub fn new() -> Self {
        Self::with_config(MemFsConfig::default())
    }

    /// Create an empty filesystem with custom configuration
    pub fn with_config(config: MemFsConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                tree: RwLock::new(Tree {
                    root: Node::root(),
                    files: 0,
                    frozen: false,
                }),
                slots: OnceLock::new(),
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &MemFsConfig {
        &self.shared.config
    }

    /// Lock the filesystem against writes. Builds the hashed slot table the
    /// first time when hashed lookup is enabled. Calling it again is a no-op.
    pub fn freeze(&self) {
        let mut tree = self.shared.tree.write();
        if tree.frozen {
            return;
        }
        tree.frozen = true;

        if self.shared.config.hashed_lookup {
            let table = SlotTable::build(&tree.root, tree.files);
            debug!(
                label = %self.shared.config.label,
                slots = table.slots.len(),
                collisions = table.collisions,
                unhashable = table.unhashable,
                "built hashed lookup table"
            );
            // Only reachable once: guarded by `frozen` under the write lock.
            let _ = self.shared.slots.set(table);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.shared.tree.read().frozen
    }

    /// Number of files (not directories)
    pub fn file_count(&self) -> usize {
        self.shared.tree.read().files
    }

    /// Paths that share a slot with an earlier path, when hashed lookup is built
    pub fn hashed_collisions(&self) -> Option<usize> {
        self.shared.slots.get().map(|t| t.collisions)
    }

    /// List a directory, sorted by name
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let segs = segments(path)?;
        let tree = self.shared.tree.read();
        let dir = tree
            .root
            .find(&segs)
            .ok_or_else(|| Error::not_found(path))?;
        if !dir.is_dir() {
            return Err(Error::invalid_path(path, "not a directory"));
        }
        Ok(dir.entries())
    }

    /// Every file with its full path, content and mode
    pub(crate) fn walk_files(&self) -> Vec<(String, Bytes, FileMode)> {
        let tree = self.shared.tree.read();
        let mut out = Vec::with_capacity(tree.files);
        tree.root.walk_files("", &mut |path, node| {
            out.push((path, node.content(), node.metadata().mode));
        });
        out
    }

    fn read_file_entry(&self, name: &str) -> Result<(Metadata, Bytes)> {
        let (meta, content) = self.shared.lookup(name)?;
        if meta.is_dir {
            return Err(Error::invalid_path(name, "is a directory"));
        }
        Ok((meta, content))
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("label", &self.shared.config.label)
            .field("files", &self.file_count())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[async_trait]
impl Tier for MemFs {
    async fn open(&self, name: &str) -> Result<FileHandle> {
        let (meta, content) = self.read_file_entry(name)?;
        Ok(Box::new(MemFile::new(meta, content)))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        self.read_file_entry(name).map(|(_, content)| content)
    }

    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()> {
        self.shared.insert_file(name, Some(content), mode)
    }

    async fn stat(&self, name: &str) -> Result<Metadata> {
        self.shared.lookup(name).map(|(meta, _)| meta)
    }

    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        if !options.is_write() {
            return self.open(name).await;
        }
        let writer = self.shared.open_writer(name, mode, options)?;
        Ok(Box::new(writer))
    }

    async fn mkdir_all(&self, path: &str, _mode: FileMode) -> Result<()> {
        self.shared.mkdir_all(path)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.shared.remove(name, false)
    }

    async fn remove_all(&self, path: &str) -> Result<()> {
        self.shared.remove(path, true)
    }

    fn label(&self) -> String {
        self.shared.config.label.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
