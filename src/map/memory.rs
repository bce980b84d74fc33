//! In-memory map
//!
//! Same contract as the direct map, without an artifact. Contents are gone
//! once the map is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::background::LiveSets;
use crate::codec::{check_key, check_value, DataType};
use crate::error::{AoError, Result};

use super::{Entry, MapBuilder, MapConfig, MapId, SortedEntries, StorageMap};

pub struct MemoryMap {
    name: String,
    id: MapId,
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
    entries: RwLock<SortedEntries<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryMap {
    pub fn new(
        name: impl Into<String>,
        id: MapId,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            entries: RwLock::new(SortedEntries::new(Arc::clone(&key_type))),
            key_type,
            value_type,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AoError::MapClosed(self.name.clone()));
        }
        Ok(())
    }
}

impl StorageMap for MemoryMap {
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
        Ok(self.entries.write().insert(key, value))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.entries.write().remove(key))
    }

    fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.entries.read().len())
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        self.ensure_open()?;
        Ok(self.entries.read().to_vec())
    }

    fn save(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.entries.write().clear();
        }
        Ok(())
    }
}

pub struct MemoryMapBuilder {
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
}

impl MemoryMapBuilder {
    pub fn new(key_type: Arc<dyn DataType>, value_type: Arc<dyn DataType>) -> Self {
        Self {
            key_type,
            value_type,
        }
    }
}

impl MapBuilder for MemoryMapBuilder {
    type Map = MemoryMap;

    fn open_map(self, config: MapConfig, live: &Arc<LiveSets>) -> Result<Arc<MemoryMap>> {
        let map = Arc::new(MemoryMap::new(
            config.name,
            config.id,
            self.key_type,
            self.value_type,
        ));
        live.add_storage_map(map.clone());
        Ok(map)
    }
}
