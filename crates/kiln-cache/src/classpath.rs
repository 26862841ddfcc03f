use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use kiln_storage::PersistentMap;

use crate::error::Result;

pub(crate) const CLASSPATH_MAP_NAME: &str = "classpath";

/// The classpath snapshot persisted by the last completed build.
///
/// Stored as a [`PersistentMap<bool>`] whose keys are classpath element
/// paths; the value is a constant presence marker and carries no further
/// information.
#[derive(Debug)]
pub struct ClasspathSet {
    map: PersistentMap<bool>,
}

impl ClasspathSet {
    pub(crate) fn open(storage_file: &Path) -> Result<Self> {
        Ok(Self {
            map: PersistentMap::open(storage_file, CLASSPATH_MAP_NAME)?,
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.map.contains(&path.to_string_lossy())
    }

    /// All persisted classpath elements.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.map.keys().into_iter().map(PathBuf::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Compare `current` against the persisted snapshot.
    pub(crate) fn compare(&self, current: &BTreeSet<PathBuf>) -> FileDifference {
        FileDifference {
            current: current.clone(),
            persisted: self.paths().into_iter().collect(),
        }
    }

    /// Replace the persisted snapshot with `current`.
    ///
    /// The previous contents are cleared first; the set is never merged.
    pub(crate) fn update(&mut self, current: &BTreeSet<PathBuf>) -> Result<()> {
        self.map.clean()?;
        for path in current {
            self.map.set(path.to_string_lossy().into_owned(), true)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        Ok(self.map.flush()?)
    }
}

/// The outcome of diffing the current classpath against the persisted
/// snapshot.
///
/// `added` and `removed` are lazy: membership tests run only as the
/// iterators are driven, so [`FileDifference::is_not_empty`] stops at the
/// first differing element. Paths are compared by their string form; the
/// caller canonicalizes before the paths reach the cache.
#[derive(Debug)]
pub struct FileDifference {
    current: BTreeSet<PathBuf>,
    persisted: BTreeSet<PathBuf>,
}

impl FileDifference {
    /// Elements of the current classpath absent from the persisted snapshot.
    pub fn added(&self) -> impl Iterator<Item = &Path> + '_ {
        self.current
            .iter()
            .filter(|path| !self.persisted.contains(*path))
            .map(PathBuf::as_path)
    }

    /// Elements of the persisted snapshot absent from the current classpath.
    pub fn removed(&self) -> impl Iterator<Item = &Path> + '_ {
        self.persisted
            .iter()
            .filter(|path| !self.current.contains(*path))
            .map(PathBuf::as_path)
    }

    /// True when the classpath changed in either direction, which forces the
    /// next build onto the conservative (non-incremental) strategy.
    pub fn is_not_empty(&self) -> bool {
        self.added().next().is_some() || self.removed().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_not_empty()
    }
}
