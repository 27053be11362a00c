//! Storage Contract
//!
//! Every tier of a cascade (memory filesystem, disk cache, OS directory,
//! or another composition) implements [`Tier`]. The composition engine only
//! ever talks to this trait, so tiers can be nested and swapped freely.
//!
//! # Capabilities
//!
//! ```text
//! required:  open · read_file · write_file · stat
//! optional:  open_file · mkdir_all · remove · remove_all   (default: Unsupported)
//! probing:   as_set_filler                                  (default: None)
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use crate::error::{Error, Result};

/// An open file handle. The read offset lives in the handle, not the file.
pub trait TierFile: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T> TierFile for T where T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

/// Boxed handle returned by [`Tier::open`] and [`Tier::open_file`]
pub type FileHandle = Box<dyn TierFile>;

/// Permission bits, passed through to tiers and never interpreted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Mode used for back-fill writes
    pub const DEFAULT: FileMode = FileMode(0o644);

    /// Mode reported for directories
    pub const DIR: FileMode = FileMode(0o755);

    /// Raw bits
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Permission bits only (rwx for user/group/other)
    #[inline]
    pub fn permissions(self) -> u32 {
        self.0 & 0o777
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Option bag for [`Tier::open_file`].
///
/// Semantics are tier-defined; composition layers forward it untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    /// Fail if the file already exists
    pub exclusive: bool,
    pub append: bool,
}

impl OpenOptions {
    /// Read-only open
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Write, creating the file if missing
    pub fn write_create() -> Self {
        Self {
            write: true,
            create: true,
            ..Default::default()
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// True when the handle will be written through
    #[inline]
    pub fn is_write(&self) -> bool {
        self.write || self.append
    }
}

/// File or directory metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Last path segment
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    pub mode: FileMode,
}

/// Directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Capability of push-style caches that pull from a filler on their own miss path
pub trait SetFiller: Send + Sync {
    /// Register the tier this cache should fill from
    fn set_filler(&self, filler: Arc<dyn Tier>);
}

/// Storage contract satisfied by every tier of a cascade
#[async_trait]
pub trait Tier: Send + Sync {
    /// Open a file for reading
    async fn open(&self, name: &str) -> Result<FileHandle>;

    /// Read a whole file
    async fn read_file(&self, name: &str) -> Result<Bytes>;

    /// Write a whole file
    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()>;

    /// Stat a file or directory
    async fn stat(&self, name: &str) -> Result<Metadata>;

    /// Open a handle with tier-defined options
    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        let _ = (name, mode, options);
        Err(Error::Unsupported { op: "open_file" })
    }

    /// Create a directory and any missing parents
    async fn mkdir_all(&self, path: &str, mode: FileMode) -> Result<()> {
        let _ = (path, mode);
        Err(Error::Unsupported { op: "mkdir_all" })
    }

    /// Remove a file or empty directory
    async fn remove(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(Error::Unsupported { op: "remove" })
    }

    /// Remove a path and everything below it
    async fn remove_all(&self, path: &str) -> Result<()> {
        let _ = path;
        Err(Error::Unsupported { op: "remove_all" })
    }

    /// The [`SetFiller`] capability, if this tier has one
    fn as_set_filler(&self) -> Option<&dyn SetFiller> {
        None
    }

    /// Human readable name used in logs and fill attribution
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Tier that served the most recent read, for tiers that track it
    fn fill_source(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl<T: Tier + ?Sized> Tier for Arc<T> {
    async fn open(&self, name: &str) -> Result<FileHandle> {
        (**self).open(name).await
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        (**self).read_file(name).await
    }

    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()> {
        (**self).write_file(name, content, mode).await
    }

    async fn stat(&self, name: &str) -> Result<Metadata> {
        (**self).stat(name).await
    }

    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        (**self).open_file(name, mode, options).await
    }

    async fn mkdir_all(&self, path: &str, mode: FileMode) -> Result<()> {
        (**self).mkdir_all(path, mode).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        (**self).remove(name).await
    }

    async fn remove_all(&self, path: &str) -> Result<()> {
        (**self).remove_all(path).await
    }

    fn as_set_filler(&self) -> Option<&dyn SetFiller> {
        (**self).as_set_filler()
    }

    fn label(&self) -> String {
        (**self).label()
    }

    fn fill_source(&self) -> Option<String> {
        (**self).fill_source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mode_display() {
        assert_eq!(FileMode::DEFAULT.to_string(), "0644");
        assert_eq!(FileMode(0o100644).permissions(), 0o644);
        assert_eq!(FileMode::default(), FileMode(0o644));
    }

    #[test]
    fn test_open_options_builders() {
        let ro = OpenOptions::read_only();
        assert!(ro.read);
        assert!(!ro.is_write());

        let wo = OpenOptions::write_create().exclusive(true);
        assert!(wo.is_write());
        assert!(wo.create && wo.exclusive);

        let ap = OpenOptions::default().append(true);
        assert!(ap.is_write());
    }

    #[test]
    fn test_metadata_serializes() {
        let meta = Metadata {
            name: "a".to_string(),
            size: 3,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            is_dir: false,
            mode: FileMode::DEFAULT,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["size"], 3);
        assert_eq!(json["mode"], 0o644);
        assert_eq!(json["is_dir"], false);
    }
}
