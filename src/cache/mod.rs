//! Cache Composition
//!
//! Read-through layering of one tier over another, nestable to any depth.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  CacheFs(t1, CacheFs(t2, t3))                                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  read_file ──▶ t1 ──miss──▶ CacheFs(t2, t3)                        │
//! │                              │                                    │
//! │                              └─▶ t2 ──miss──▶ t3 (system of record)│
//! │                                                                   │
//! │  on a store hit each level back-fills its own cache tier          │
//! │  in a background job: t2 from t3, then t1 from the inner result   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Consistency
//!
//! A read and the back-fill it triggers are not ordered; a caller racing
//! the two may see the cache tier miss again. Back-fill failures only cost
//! a later miss and are logged, not surfaced.
//!
//! `open` never fills (streaming callers would otherwise force the whole
//! file into memory), and writes target the store only.

mod engine;
mod metrics;

pub use engine::{CacheFs, CacheFsConfig};
pub use metrics::{FillMetrics, FillMetricsSnapshot};
