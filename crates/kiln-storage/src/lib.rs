//! Durable string-keyed maps for Kiln's incremental build cache.
//!
//! ## Format
//! Each map is stored as a single bincode payload (fixint, little-endian,
//! size-limited on read) containing:
//! - magic bytes and the storage format version
//! - the Kiln version that wrote the file
//! - the map's name
//! - the entries, as a `BTreeMap<String, V>`
//!
//! ## Durability
//! Every mutating call rewrites the storage file atomically (temp file +
//! fsync + rename) before returning. There is no buffering layer: state on
//! disk always reflects the last completed mutation, which is exactly the
//! partial-consistency model an incremental build needs after a crash.
//!
//! ## Compatibility
//! Files carrying a different format version, Kiln version, or map name are
//! discarded on open and the map starts empty. Losing the cache costs one
//! full rebuild; reinterpreting a stale file could corrupt builds silently.

mod error;
mod map;
mod util;

pub use error::{Result, StorageError};
pub use map::{PersistentMap, STORAGE_FORMAT_VERSION};
pub use util::STORAGE_PAYLOAD_LIMIT_BYTES;
