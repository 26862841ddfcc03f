use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::{
    atomic_write, bincode_deserialize, bincode_serialize, read_file_limited,
    remove_file_best_effort,
};

/// Version of the on-disk persistent map format.
///
/// This gates the wrapper struct written to every storage file. Bump it
/// whenever the wrapper layout changes; old files are discarded on open.
pub const STORAGE_FORMAT_VERSION: u32 = 1;

const STORAGE_MAGIC: [u8; 8] = *b"KILNMAP\0";

#[derive(Debug, Serialize)]
struct MapFile<'a, V> {
    magic: [u8; 8],
    format_version: u32,
    kiln_version: &'a str,
    map_name: &'a str,
    entries: &'a BTreeMap<String, V>,
}

#[derive(Debug, Deserialize)]
struct MapFileOwned<V> {
    magic: [u8; 8],
    format_version: u32,
    kiln_version: String,
    map_name: String,
    entries: BTreeMap<String, V>,
}

/// A durable map from string keys to values of a declared type, backed by a
/// single storage file.
///
/// Mutating calls are write-through: the storage file is rewritten
/// atomically before the call returns, so the on-disk representation and the
/// in-memory view never diverge across process exits. A crash between two
/// mutations leaves exactly the state recorded up to the crash point.
///
/// Keys are expected to be canonicalized by the caller before they reach the
/// map; the map compares them as plain strings.
#[derive(Debug)]
pub struct PersistentMap<V> {
    name: String,
    path: PathBuf,
    entries: BTreeMap<String, V>,
}

impl<V> PersistentMap<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Open the map stored at `path`, creating an empty one if the file does
    /// not exist.
    ///
    /// A file written by a different format or Kiln version, carrying a
    /// different map name, or failing to decode is discarded with a warning:
    /// stale state must not leak into a build, and an empty map merely costs
    /// a full rebuild.
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = name.into();

        let entries = match read_file_limited(&path) {
            None => BTreeMap::new(),
            Some(bytes) => match bincode_deserialize::<MapFileOwned<V>>(&bytes) {
                Ok(file)
                    if file.magic == STORAGE_MAGIC
                        && file.format_version == STORAGE_FORMAT_VERSION
                        && file.kiln_version == kiln_core::KILN_VERSION
                        && file.map_name == name =>
                {
                    file.entries
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        target = "kiln.storage",
                        path = %path.display(),
                        map = %name,
                        "discarding incompatible or corrupt storage file"
                    );
                    remove_file_best_effort(&path);
                    BTreeMap::new()
                }
            },
        };

        Ok(Self {
            name,
            path,
            entries,
        })
    }

    /// The stored value for `key`, if any. No side effect on a miss.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Associate `key` with `value`, overwriting any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Result<()> {
        self.entries.insert(key.into(), value);
        self.persist()
    }

    /// Delete `key` entirely. Removing an absent key is a no-op, not an
    /// error.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist()
    }

    /// All keys, as a snapshot taken at call time.
    ///
    /// Mutations made after this call are never reflected in an
    /// already-returned snapshot.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Remove all entries.
    pub fn clean(&mut self) -> Result<()> {
        self.entries.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the storage file from the in-memory state.
    ///
    /// Mutations are write-through, so this only matters for materializing
    /// the storage file of a map that has never been mutated.
    pub fn flush(&mut self) -> Result<()> {
        self.persist()
    }

    /// Flush and consume the map.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn persist(&self) -> Result<()> {
        let file = MapFile {
            magic: STORAGE_MAGIC,
            format_version: STORAGE_FORMAT_VERSION,
            kiln_version: kiln_core::KILN_VERSION,
            map_name: &self.name,
            entries: &self.entries,
        };
        let bytes = bincode_serialize(&file)?;
        atomic_write(&self.path, &bytes)
    }
}

impl<E> PersistentMap<Vec<E>>
where
    E: Serialize + DeserializeOwned,
{
    /// Append `element` to the collection stored at `key`, creating the
    /// collection if the key is absent.
    ///
    /// Elements accumulate in insertion order and are not deduplicated; the
    /// whole collection is read, extended, and written back.
    pub fn append(&mut self, key: impl Into<String>, element: E) -> Result<()> {
        self.entries.entry(key.into()).or_default().push(element);
        self.persist()
    }
}
