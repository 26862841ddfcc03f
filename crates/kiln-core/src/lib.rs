//! Core shared constants and filesystem helpers for Kiln.
//!
//! This crate is intentionally small and dependency-free.

use std::io;
use std::path::{Path, PathBuf};

/// The Kiln version string, used to gate persisted cache state.
///
/// Persistent maps embed this version in their storage files; a file written
/// by a different Kiln version is discarded rather than reinterpreted.
pub const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonicalize `path`, falling back to the unmodified path when it does not
/// exist yet.
///
/// Build outputs are routinely canonicalized before they have been written,
/// so `NotFound` is not an error here.
pub fn canonicalize_if_possible(path: &Path) -> io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(e) => Err(e),
    }
}
