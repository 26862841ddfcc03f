//! Persistent incremental-build cache for one build target.
//!
//! The cache tracks which artifact files (e.g. compiled class files) each
//! source file produced, plus a snapshot of the classpath used by the last
//! completed build. A build driver diffs the current classpath against the
//! snapshot to decide between an incremental and a full rebuild, reports
//! produced artifacts as compilation units finish, and removes entries when
//! sources disappear.
//!
//! ## On-disk layout
//!
//! A cache root directory owns one storage file per named sub-map, plus the
//! single-owner lock:
//! - `sources-to-classfiles.bin`: source path → ordered artifact paths
//! - `classpath.bin`: the persisted classpath element set
//! - `.lock`: held exclusively for the cache's lifetime
//!
//! Map keys are canonicalized absolute paths in string form.
//! Canonicalization (case/symlink normalization) is the caller's
//! responsibility before paths reach the cache; see
//! [`kiln_core::canonicalize_if_possible`].
//!
//! ## Usage per build session
//!
//! One [`TargetCache`] per build, single writer:
//! 1. `compare_classpath` before the build decides incremental-vs-full;
//! 2. `save_artifact` per completed compilation unit;
//! 3. `remove_artifacts_by_sources` for deleted sources;
//! 4. `update_classpath` after the build completed successfully;
//! 5. `close` (or drop) releases the root.

mod classpath;
mod error;
mod lock;
mod source_map;
mod target_cache;

pub use classpath::{ClasspathSet, FileDifference};
pub use error::{CacheError, Result};
pub use lock::CacheRootLock;
pub use source_map::SourceToArtifactsMap;
pub use target_cache::TargetCache;
