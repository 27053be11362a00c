//! OS Filesystem Tier
//!
//! A directory on the local filesystem exposed through the storage contract.
//! Names are relative to the tier root; components that would leave the root
//! are rejected.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::{Error, Result};
use crate::tier::{FileHandle, FileMode, Metadata, OpenOptions, Tier};

/// Tier rooted at a local directory
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    /// Create a tier rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a tier name to a path below the root
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for comp in Path::new(name.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(c) => path.push(c),
                Component::CurDir => {}
                _ => return Err(Error::invalid_path(name, "path escapes the tier root")),
            }
        }
        Ok(path)
    }

    async fn ensure_parent(&self, name: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_io(name, e))?;
        }
        Ok(())
    }
}

fn to_metadata(name: &str, meta: &std::fs::Metadata) -> Metadata {
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        FileMode(meta.permissions().mode())
    };
    #[cfg(not(unix))]
    let mode = if meta.is_dir() {
        FileMode::DIR
    } else {
        FileMode::DEFAULT
    };

    Metadata {
        name: Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string()),
        size: meta.len(),
        modified: meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now()),
        is_dir: meta.is_dir(),
        mode,
    }
}

#[async_trait]
impl Tier for OsFs {
    async fn open(&self, name: &str) -> Result<FileHandle> {
        let path = self.resolve(name)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Error::from_io(name, e))?;
        Ok(Box::new(file))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        let path = self.resolve(name)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::from_io(name, e))?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()> {
        let path = self.resolve(name)?;
        self.ensure_parent(name, &path).await?;
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| Error::from_io(name, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode.permissions()))
                .await
                .map_err(|e| Error::from_io(name, e))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        trace!(path = %path.display(), size = content.len(), "wrote file");
        Ok(())
    }

    async fn stat(&self, name: &str) -> Result<Metadata> {
        let path = self.resolve(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::from_io(name, e))?;
        Ok(to_metadata(name, &meta))
    }

    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        let path = self.resolve(name)?;
        if options.create || options.exclusive {
            self.ensure_parent(name, &path).await?;
        }

        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(options.read || !options.is_write())
            .write(options.write)
            .append(options.append)
            .truncate(options.truncate)
            .create(options.create)
            .create_new(options.exclusive);
        #[cfg(unix)]
        opts.mode(mode.permissions());
        #[cfg(not(unix))]
        let _ = mode;

        let file = opts.open(&path).await.map_err(|e| Error::from_io(name, e))?;
        Ok(Box::new(file))
    }

    async fn mkdir_all(&self, path: &str, mode: FileMode) -> Result<()> {
        let dir = self.resolve(path)?;
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode.permissions());
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(&dir).await.map_err(|e| Error::from_io(path, e))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        if path == self.root {
            return Err(Error::invalid_path(name, "cannot remove the tier root"));
        }
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::from_io(name, e))?;
        let res = if meta.is_dir() {
            tokio::fs::remove_dir(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        res.map_err(|e| Error::from_io(name, e))
    }

    async fn remove_all(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(Error::invalid_path(path, "cannot remove the tier root"));
        }
        let meta = match tokio::fs::metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        };
        let res = if meta.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        res.map_err(|e| Error::from_io(path, e))
    }

    fn label(&self) -> String {
        format!("osfs:{}", self.root.display())
    }
}

// =============================================================================
// Tests
// =============================================================================
