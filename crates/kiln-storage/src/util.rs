use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StorageError};

/// Hard upper bound for any bincode-encoded storage payload we will attempt
/// to deserialize from disk.
///
/// Corruption must degrade to an empty map, not an out-of-memory crash, so
/// a corrupted length prefix cannot request an enormous allocation.
pub const STORAGE_PAYLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

pub(crate) fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn bincode_options_limited() -> impl bincode::Options + Copy {
    bincode_options().with_limit(STORAGE_PAYLOAD_LIMIT_BYTES as u64)
}

pub(crate) fn bincode_serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode_options().serialize(value)?)
}

pub(crate) fn bincode_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode_options_limited().deserialize(bytes)?)
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// fsync, rename over the destination, then best-effort directory sync.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(StorageError::Io(io::Error::other("path has no parent"))),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| StorageError::Io(err.error))?;

    sync_dir_best_effort(parent);
    Ok(())
}

fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(
                    target = "kiln.storage",
                    dir = %dir.display(),
                    error = %err,
                    "failed to sync directory (best effort)"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

/// Read a storage file, enforcing the payload size cap.
///
/// Returns `None` for a missing file, a symlink (we never follow symlinks
/// out of the cache root), or an oversized file.
pub(crate) fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            // A missing storage file is an expected fresh-cache case.
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "kiln.storage",
                    path = %path.display(),
                    error = %err,
                    "failed to stat storage file"
                );
            }
            return None;
        }
    };
    if meta.file_type().is_symlink() || !meta.is_file() {
        return None;
    }
    if meta.len() > STORAGE_PAYLOAD_LIMIT_BYTES as u64 {
        return None;
    }

    match fs::read(path) {
        Ok(bytes) if bytes.len() <= STORAGE_PAYLOAD_LIMIT_BYTES => Some(bytes),
        Ok(_) => None,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "kiln.storage",
                    path = %path.display(),
                    error = %err,
                    "failed to read storage file"
                );
            }
            None
        }
    }
}

pub(crate) fn remove_file_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::debug!(
                target = "kiln.storage",
                path = %path.display(),
                error = %err,
                "failed to remove storage file"
            );
        }
    }
}
