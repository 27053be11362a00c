//! Property-Based Tests for the Memory Filesystem
//!
//! # Test Properties
//!
//! 1. **Hashed Round Trip**: every file written before a hashed freeze reads
//!    back with identical content afterwards
//! 2. **Write Once**: a second write to a path fails and leaves the first content
//! 3. **Frozen**: every write after freeze fails with ReadOnly

#![cfg(test)]

use std::collections::BTreeMap;

use bytes::Bytes;
use proptest::prelude::*;

use super::{MemFs, MemFsConfig};
use crate::error::Error;
use crate::tier::{FileMode, Tier};

// =============================================================================
// Property Strategies
// =============================================================================

/// ASCII path of 1-4 segments
fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_.-]{1,8}", 1..=4).prop_map(|segs| {
        segs.into_iter()
            .map(|s| if s == "." || s == ".." { "dot".to_string() } else { s })
            .collect::<Vec<_>>()
            .join("/")
    })
}

/// File set where no path is a directory prefix of another
fn file_set_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        path_strategy(),
        prop::collection::vec(any::<u8>(), 0..64),
        1..40,
    )
    .prop_map(|files| {
        let paths: Vec<String> = files.keys().cloned().collect();
        files
            .into_iter()
            .filter(|(p, _)| {
                !paths
                    .iter()
                    .any(|other| other != p && other.starts_with(&format!("{}/", p)))
            })
            .collect()
    })
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(f)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: hashed lookup never loses or mixes up a file.
    #[test]
    fn prop_hashed_round_trip(files in file_set_strategy()) {
        let fs = MemFs::with_config(MemFsConfig {
            hashed_lookup: true,
            ..Default::default()
        });

        block_on(async {
            for (path, content) in &files {
                fs.write_file(path, Bytes::from(content.clone()), FileMode::DEFAULT)
                    .await
                    .unwrap();
            }
        });
        fs.freeze();
        prop_assert_eq!(fs.file_count(), files.len());

        for (path, content) in &files {
            let got = block_on(fs.read_file(path)).unwrap();
            prop_assert_eq!(&got[..], &content[..]);
        }
    }

    /// Property: write-once holds for any path and content.
    #[test]
    fn prop_write_once(path in path_strategy(), first in any::<Vec<u8>>(), second in any::<Vec<u8>>()) {
        let fs = MemFs::new();
        block_on(async {
            fs.write_file(&path, Bytes::from(first.clone()), FileMode::DEFAULT).await.unwrap();
            let err = fs.write_file(&path, Bytes::from(second), FileMode::DEFAULT).await;
            assert!(matches!(err, Err(Error::AlreadyExists { .. })));
            assert_eq!(&fs.read_file(&path).await.unwrap()[..], &first[..]);
        });
    }

    /// Property: after freeze nothing can be written, however often it is tried.
    #[test]
    fn prop_frozen_rejects_writes(paths in prop::collection::vec(path_strategy(), 1..20)) {
        let fs = MemFs::new();
        fs.freeze();
        for path in &paths {
            let res = block_on(fs.write_file(path, Bytes::from_static(b"x"), FileMode::DEFAULT));
            let is_read_only = matches!(res, Err(Error::ReadOnly { .. }));
            prop_assert!(is_read_only);
        }
        prop_assert_eq!(fs.file_count(), 0);
    }
}
