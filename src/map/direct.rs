//! Direct map
//!
//! Plain sorted map, persisted as one snapshot artifact per map.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::background::LiveSets;
use crate::codec::{check_key, check_value, DataType};
use crate::error::{AoError, Result};
use crate::storage::MapFile;

use super::{Entry, MapBuilder, MapConfig, MapId, SortedEntries, StorageMap};

/// Sorted map writing straight into its own entry table
///
/// ## Concurrency:
/// - `entries`: RwLock (many concurrent readers, exclusive writer)
/// - `dirty`: set after every mutation, cleared by `save`
/// - `save_lock`: one snapshot write at a time (scheduler flush vs. commit)
pub struct DirectMap {
    name: String,
    id: MapId,
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,

    entries: RwLock<SortedEntries<Vec<u8>>>,

    /// Artifact location; `None` when the engine doesn't persist
    path: Option<PathBuf>,

    dirty: AtomicBool,
    closed: AtomicBool,
    save_lock: Mutex<()>,
}

impl DirectMap {
    /// Open the map, loading its artifact if one exists
    pub fn open(
        config: &MapConfig,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Result<Self> {
        let path = config.artifact_path();

        let entries = match &path {
            Some(path) if path.exists() => {
                let file = MapFile::read(path)?;
                if file.name != config.name || file.id != config.id {
                    return Err(AoError::Corruption(format!(
                        "{}: holds map {:?} id {}, expected {:?} id {}",
                        path.display(),
                        file.name,
                        file.id,
                        config.name,
                        config.id
                    )));
                }
                tracing::debug!(
                    "Loaded {} entries for map {:?} from {}",
                    file.entries.len(),
                    config.name,
                    path.display()
                );
                SortedEntries::from_unsorted(Arc::clone(&key_type), file.entries)
            }
            _ => SortedEntries::new(Arc::clone(&key_type)),
        };

        Ok(Self {
            name: config.name.clone(),
            id: config.id,
            key_type,
            value_type,
            entries: RwLock::new(entries),
            path,
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        })
    }

    pub fn key_type(&self) -> &Arc<dyn DataType> {
        &self.key_type
    }

    pub fn value_type(&self) -> &Arc<dyn DataType> {
        &self.value_type
    }

    /// Artifact path, if persisted
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether there are changes the last save didn't capture
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AoError::MapClosed(self.name.clone()));
        }
        Ok(())
    }
}

impl StorageMap for DirectMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> MapId {
        self.id
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        check_key(self.key_type.as_ref(), &key)?;
        check_value(self.value_type.as_ref(), &value)?;

        let previous = self.entries.write().insert(key, value);
        self.dirty.store(true, Ordering::Release);
        Ok(previous)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let previous = self.entries.write().remove(key);
        if previous.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(previous)
    }

    fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.entries.read().len())
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        self.ensure_open()?;
        Ok(self.entries.read().to_vec())
    }

    /// Write a snapshot if anything changed since the last one.
    ///
    /// `dirty` is cleared before the snapshot is taken, so a write racing
    /// with the save marks the map dirty again for the next one.
    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::Release);
            return Ok(());
        };

        let _guard = self.save_lock.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = self.entries.read().to_vec();
        if let Err(e) = MapFile::write(path, &self.name, self.id, &snapshot) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }

        tracing::trace!("Saved map {:?} ({} entries)", self.name, snapshot.len());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.save()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Builds a [`DirectMap`] and registers it for flushing
pub struct DirectMapBuilder {
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
}

impl DirectMapBuilder {
    pub fn new(key_type: Arc<dyn DataType>, value_type: Arc<dyn DataType>) -> Self {
        Self {
            key_type,
            value_type,
        }
    }
}

impl MapBuilder for DirectMapBuilder {
    type Map = DirectMap;

    fn open_map(self, config: MapConfig, live: &Arc<LiveSets>) -> Result<Arc<DirectMap>> {
        let map = Arc::new(DirectMap::open(&config, self.key_type, self.value_type)?);
        live.add_storage_map(map.clone());
        Ok(map)
    }
}
