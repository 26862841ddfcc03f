use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_storage::PersistentMap;

use crate::error::Result;

pub(crate) const SOURCES_TO_CLASSFILES_MAP_NAME: &str = "sources-to-classfiles";

/// Maps a source file to the artifact files it produced, in production
/// order.
///
/// One source accumulates artifacts across incremental runs; entries are
/// appended, never deduplicated. Callers must not report the same artifact
/// twice for the same source.
#[derive(Debug)]
pub struct SourceToArtifactsMap {
    map: PersistentMap<Vec<String>>,
}

impl SourceToArtifactsMap {
    pub(crate) fn open(storage_file: &Path) -> Result<Self> {
        Ok(Self {
            map: PersistentMap::open(storage_file, SOURCES_TO_CLASSFILES_MAP_NAME)?,
        })
    }

    /// Record that `source` produced `artifact`.
    pub(crate) fn add(&mut self, source: &Path, artifact: &Path) -> Result<()> {
        self.map.append(
            source.to_string_lossy().into_owned(),
            artifact.to_string_lossy().into_owned(),
        )?;
        Ok(())
    }

    /// Artifacts recorded for `source`, in the order they were added. Empty
    /// if the source is unknown.
    pub fn get(&self, source: &Path) -> Vec<PathBuf> {
        self.map
            .get(&source.to_string_lossy())
            .map(|artifacts| artifacts.iter().map(PathBuf::from).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.map.contains(&source.to_string_lossy())
    }

    /// All sources with recorded artifacts.
    pub fn sources(&self) -> Vec<PathBuf> {
        self.map.keys().into_iter().map(PathBuf::from).collect()
    }

    /// Remove the entry for `source`, deleting its recorded artifact files.
    ///
    /// File deletion is best-effort: a failure is logged and the entry is
    /// removed regardless, so the map never keeps claiming artifacts it
    /// failed to clean up.
    pub(crate) fn remove(&mut self, source: &Path) -> Result<()> {
        for artifact in self.get(source) {
            tracing::debug!(
                target = "kiln.cache",
                artifact = %artifact.display(),
                source = %source.display(),
                "deleting artifact while clearing cache entry"
            );
            match fs::remove_file(&artifact) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(
                        target = "kiln.cache",
                        artifact = %artifact.display(),
                        error = %err,
                        "failed to delete artifact"
                    );
                }
            }
        }
        Ok(self.map.remove(&source.to_string_lossy())?)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        Ok(self.map.flush()?)
    }
}
