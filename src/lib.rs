//! cascadefs - Tiered Filesystem Caching
//!
//! Named byte blobs read and written through a uniform storage contract,
//! cascading through any chain of cache tiers down to a system of record
//! and back-filling the faster tiers on a miss.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          CacheFs                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    MemFs     │───▶│  DiskCache   │───▶│     OsFs     │       │
//! │  │ (write-once, │    │ (TTL expiry, │    │  (system of  │       │
//! │  │  hashed)     │    │  sweeper)    │    │   record)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`tier`] - Storage contract shared by every tier
//! - [`cache`] - Read-through composition with asynchronous back-fill
//! - [`disk`] - Expiring disk cache and its expiry index
//! - [`memfs`] - In-memory filesystem with hashed frozen lookup
//! - [`osfs`] - Local directory tier
//! - [`error`] - Error types

pub mod cache;
pub mod disk;
pub mod error;
pub mod memfs;
pub mod osfs;
pub mod tier;

// Re-export commonly used types
pub use cache::{CacheFs, CacheFsConfig, FillMetricsSnapshot};
pub use disk::{DiskCache, DiskCacheConfig, ExpiryIndex};
pub use error::{Error, Result};
pub use memfs::{MemFs, MemFsConfig};
pub use osfs::OsFs;
pub use tier::{FileHandle, FileMode, Metadata, OpenOptions, SetFiller, Tier};
