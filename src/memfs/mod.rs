//! Memory Filesystem
//!
//! In-process tree of named nodes, usable as a cache tier or as a general
//! embeddable filesystem.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                            MemFs                                │
//! ├────────────────────────────────────────────────────────────────┤
//! │  path parsing ──▶ RwLock<Node tree>  (sorted children,          │
//! │                                       binary search per level)  │
//! │                                                                 │
//! │  freeze() ──▶ SlotTable  (pearson64(path) % file_count)         │
//! │               frozen reads resolve in O(1), tree as fallback    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Write-once
//!
//! `write_file` never overwrites. A cache entry, once filled, stays as it is
//! until removed, and downstream composition relies on `AlreadyExists` /
//! `NotFound` to tell the states apart.

mod file;
mod fs;
mod merge;
mod node;
mod pearson;
mod proptest;

pub use file::{MemFile, MemWriter};
pub use fs::{MemFs, MemFsConfig};
pub use merge::{merge, Transform};
