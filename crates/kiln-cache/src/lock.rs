use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use fs2::FileExt as _;

use crate::error::{CacheError, Result};

const LOCK_FILE_NAME: &str = ".lock";

/// Exclusive ownership of a cache root, held for the cache's lifetime.
///
/// A cache root is a single-owner resource; a second build invocation
/// against the same root fails fast with [`CacheError::CacheRootBusy`]
/// instead of blocking. The lock is released when the value is dropped.
#[derive(Debug)]
pub struct CacheRootLock {
    file: File,
    lock_path: PathBuf,
}

impl CacheRootLock {
    /// Try to acquire exclusive ownership of `root`.
    pub fn acquire(root: &Path) -> Result<Self> {
        let lock_path = root.join(LOCK_FILE_NAME);

        // `fs2` file locks are process-scoped on Unix platforms (they don't
        // exclude other threads in the same process), so reserve the path
        // in-process first.
        {
            let mut owned = owned_roots()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !owned.insert(lock_path.clone()) {
                return Err(CacheError::CacheRootBusy {
                    path: root.to_path_buf(),
                });
            }
        }

        match Self::lock_file(&lock_path) {
            Ok(file) => Ok(Self { file, lock_path }),
            Err(err) => {
                release_owned_root(&lock_path);
                match err {
                    LockFileError::Contended => Err(CacheError::CacheRootBusy {
                        path: root.to_path_buf(),
                    }),
                    LockFileError::Io(err) => Err(CacheError::Io(err)),
                }
            }
        }
    }

    fn lock_file(lock_path: &Path) -> std::result::Result<File, LockFileError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(LockFileError::Io)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(LockFileError::Contended)
            }
            Err(err) => Err(LockFileError::Io(err)),
        }
    }
}

enum LockFileError {
    Contended,
    Io(io::Error),
}

impl Drop for CacheRootLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        release_owned_root(&self.lock_path);
    }
}

fn owned_roots() -> &'static Mutex<HashSet<PathBuf>> {
    static OWNED_ROOTS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OWNED_ROOTS.get_or_init(|| Mutex::new(HashSet::new()))
}

fn release_owned_root(lock_path: &Path) {
    let mut owned = owned_roots()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    owned.remove(lock_path);
}
