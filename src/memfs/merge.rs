//! Copy the files of a [`MemFs`] into any other tier.

use bytes::Bytes;
use tracing::debug;

use super::MemFs;
use crate::error::{Error, Result};
use crate::tier::Tier;

/// Rewrites a file's content during [`merge`]. Receives the file's base name;
/// returning `Ok(None)` skips the file.
pub type Transform = dyn Fn(&str, Bytes) -> Result<Option<Bytes>> + Send + Sync;

/// Merge every file in `from` into `into`, placing it under `prefix`.
///
/// `prefix` must be `""`, `"/"` or end with `/`. Files that already exist in
/// `into` fail the merge with whatever error `into` reports; files copied
/// before the failure stay copied. Returns the number of files written.
pub async fn merge<T>(
    into: &T,
    from: &MemFs,
    prefix: &str,
    transform: Option<&Transform>,
) -> Result<usize>
where
    T: Tier + ?Sized,
{
    let prefix = match prefix {
        "" | "/" => "",
        p if !p.ends_with('/') => {
            return Err(Error::invalid_path(p, "merge prefix must end with '/'"));
        }
        p => p.trim_start_matches("./").trim_start_matches('/'),
    };

    let mut written = 0;
    for (path, content, mode) in from.walk_files() {
        let content = match transform {
            Some(t) => {
                let base = path.rsplit('/').next().unwrap_or(path.as_str());
                match t(base, content)? {
                    Some(c) => c,
                    None => continue,
                }
            }
            None => content,
        };
        into.write_file(&format!("{}{}", prefix, path), content, mode)
            .await?;
        written += 1;
    }

    debug!(into = %into.label(), from = %from.label(), written, "merged memfs");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::FileMode;
    use assert_matches::assert_matches;

    async fn source() -> MemFs {
        let fs = MemFs::new();
        for (p, c) in [("app.js", "js"), ("lib/util.js", "util"), ("lib/readme.md", "doc")] {
            fs.write_file(p, Bytes::from(c), FileMode::DEFAULT)
                .await
                .unwrap();
        }
        fs
    }

    #[tokio::test]
    async fn test_merge_with_prefix() {
        let from = source().await;
        let into = MemFs::new();

        let n = merge(&into, &from, "/static/", None).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(into.read_file("static/lib/util.js").await.unwrap(), "util");
        assert_eq!(into.read_file("static/app.js").await.unwrap(), "js");
    }

    #[tokio::test]
    async fn test_merge_at_root() {
        let from = source().await;
        let into = MemFs::new();
        merge(&into, &from, "/", None).await.unwrap();
        assert_eq!(into.file_count(), 3);
        assert_eq!(into.read_file("lib/readme.md").await.unwrap(), "doc");
    }

    #[tokio::test]
    async fn test_merge_transform_and_skip() {
        let from = source().await;
        let into = MemFs::new();

        let transform: &Transform = &|name: &str, content: Bytes| -> Result<Option<Bytes>> {
            if name.ends_with(".md") {
                return Ok(None);
            }
            Ok(Some(Bytes::from(format!(
                "min:{}",
                String::from_utf8_lossy(&content)
            ))))
        };
        let n = merge(&into, &from, "", Some(transform)).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(into.read_file("lib/util.js").await.unwrap(), "min:util");
        assert_matches!(
            into.read_file("lib/readme.md").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_merge_bad_prefix() {
        let from = source().await;
        let into = MemFs::new();
        assert_matches!(
            merge(&into, &from, "static", None).await,
            Err(Error::InvalidPath { .. })
        );
    }

    #[tokio::test]
    async fn test_merge_conflict_surfaces() {
        let from = source().await;
        let into = MemFs::new();
        into.write_file("lib/util.js", Bytes::from("mine"), FileMode::DEFAULT)
            .await
            .unwrap();
        assert_matches!(
            merge(&into, &from, "", None).await,
            Err(Error::AlreadyExists { .. })
        );
        assert_eq!(into.read_file("lib/util.js").await.unwrap(), "mine");
    }
}
