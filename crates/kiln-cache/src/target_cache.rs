use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::classpath::{ClasspathSet, FileDifference, CLASSPATH_MAP_NAME};
use crate::error::Result;
use crate::lock::CacheRootLock;
use crate::source_map::{SourceToArtifactsMap, SOURCES_TO_CLASSFILES_MAP_NAME};

/// Flush capability shared by every sub-map the controller owns.
trait CacheMap {
    fn flush(&mut self) -> Result<()>;
}

impl CacheMap for SourceToArtifactsMap {
    fn flush(&mut self) -> Result<()> {
        SourceToArtifactsMap::flush(self)
    }
}

impl CacheMap for ClasspathSet {
    fn flush(&mut self) -> Result<()> {
        ClasspathSet::flush(self)
    }
}

/// One build target's persistent cache state.
///
/// Owns the cache root directory, the single-owner lock, and the named
/// sub-maps stored under it. The sub-maps form the controller's registry:
/// lifecycle operations ([`TargetCache::flush`], [`TargetCache::close`])
/// propagate to all of them uniformly.
#[derive(Debug)]
pub struct TargetCache {
    root: PathBuf,
    sources_to_artifacts: SourceToArtifactsMap,
    classpath: ClasspathSet,
    // Declared last: the lock must outlive the maps on drop.
    _lock: CacheRootLock,
}

impl TargetCache {
    /// Open (creating if needed) the cache rooted at `cache_root`.
    ///
    /// The root is a single-owner resource: a second open of the same root
    /// fails with [`crate::CacheError::CacheRootBusy`] until this cache is
    /// dropped.
    pub fn open(cache_root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(cache_root.as_ref())?;
        let root = kiln_core::canonicalize_if_possible(cache_root.as_ref())?;

        let lock = CacheRootLock::acquire(&root)?;
        let sources_to_artifacts =
            SourceToArtifactsMap::open(&storage_file(&root, SOURCES_TO_CLASSFILES_MAP_NAME))?;
        let classpath = ClasspathSet::open(&storage_file(&root, CLASSPATH_MAP_NAME))?;

        Ok(Self {
            root,
            sources_to_artifacts,
            classpath,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record a produced artifact for every source file that contributed to
    /// it.
    ///
    /// This is the single point where new source-to-artifact edges enter the
    /// cache. The build driver must report each produced artifact exactly
    /// once per build; duplicates accumulate.
    pub fn save_artifact(&mut self, source_files: &[PathBuf], output_file: &Path) -> Result<()> {
        for source in source_files {
            self.sources_to_artifacts.add(source, output_file)?;
        }
        Ok(())
    }

    /// Artifacts previously recorded for `source`, in production order.
    pub fn artifacts_for(&self, source: &Path) -> Vec<PathBuf> {
        self.sources_to_artifacts.get(source)
    }

    /// Drop the cache entries for `sources`, deleting their recorded
    /// artifact files along the way.
    pub fn remove_artifacts_by_sources(
        &mut self,
        sources: impl IntoIterator<Item = PathBuf>,
    ) -> Result<()> {
        for source in sources {
            self.sources_to_artifacts.remove(&source)?;
        }
        Ok(())
    }

    /// Diff `current` against the classpath persisted by the last completed
    /// build.
    pub fn compare_classpath(&self, current: &BTreeSet<PathBuf>) -> FileDifference {
        self.classpath.compare(current)
    }

    /// Persist `current` as the new classpath snapshot, fully replacing the
    /// previous one.
    ///
    /// Call this only after the build that used `current` completed
    /// successfully. Committing earlier records a classpath for artifacts
    /// that were never actually produced under it.
    pub fn update_classpath(&mut self, current: &BTreeSet<PathBuf>) -> Result<()> {
        self.classpath.update(current)
    }

    /// Read access to the source-to-artifacts sub-map.
    pub fn sources_to_artifacts(&self) -> &SourceToArtifactsMap {
        &self.sources_to_artifacts
    }

    /// Read access to the persisted classpath sub-map.
    pub fn classpath(&self) -> &ClasspathSet {
        &self.classpath
    }

    fn registered_maps(&mut self) -> [&mut dyn CacheMap; 2] {
        [&mut self.sources_to_artifacts, &mut self.classpath]
    }

    /// Flush every registered sub-map.
    pub fn flush(&mut self) -> Result<()> {
        for map in self.registered_maps() {
            map.flush()?;
        }
        Ok(())
    }

    /// Flush every sub-map and release the cache root.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

impl Drop for TargetCache {
    fn drop(&mut self) {
        // Mutations are write-through; this materializes storage files for
        // maps that were never touched and covers failure exit paths of the
        // owning build.
        if let Err(err) = self.flush() {
            tracing::warn!(
                target = "kiln.cache",
                root = %self.root.display(),
                error = %err,
                "failed to flush cache on drop"
            );
        }
    }
}

/// Storage file path for a named sub-map under `root`.
pub(crate) fn storage_file(root: &Path, map_name: &str) -> PathBuf {
    root.join(format!("{map_name}.bin"))
}
