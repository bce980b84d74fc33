//! Buffered map
//!
//! A map whose writes land in a [`WriteBuffer`] and reach the backing map
//! only when merged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::background::LiveSets;
use crate::codec::{check_key, check_value, DataType};
use crate::error::{AoError, Result};
use crate::map::{DirectMap, Entry, MapBuilder, MapConfig, MapId, SortedEntries, StorageMap};

use super::{BufferEntry, MergeStats, Mergeable, WriteBuffer};

/// Write-buffered view over a backing map
///
/// ## Concurrency:
/// - Reads and writes never wait on a merge; they only take the buffer's
///   internal lock and the backing map's own locks.
/// - A write to a key with no buffered slot reads the backing map under the
///   buffer's write lock, so the previous value it returns is exact even
///   while a merge runs.
/// - `merge_lock` serializes merges (background merge, close, a mode switch)
///   and full scans, which need the buffer and backing to hold still relative
///   to each other.
pub struct BufferedMap {
    backing: Arc<dyn StorageMap>,
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
    buffer: WriteBuffer,
    merge_lock: Mutex<()>,
    closed: AtomicBool,
}

impl BufferedMap {
    pub fn new(
        backing: Arc<dyn StorageMap>,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Self {
        Self {
            backing,
            buffer: WriteBuffer::new(Arc::clone(&key_type)),
            key_type,
            value_type,
            merge_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// The map merges drain into
    pub fn backing(&self) -> &Arc<dyn StorageMap> {
        &self.backing
    }

    /// Number of slots (values and tombstones) waiting for a merge
    pub fn pending_count(&self) -> usize {
        self.buffer.entry_count()
    }

    /// Approximate bytes waiting for a merge
    pub fn pending_bytes(&self) -> usize {
        self.buffer.size()
    }

    /// Drain the buffer into the backing map in key order.
    ///
    /// Each slot is written to the backing map before it is dropped from the
    /// buffer, and dropped only if it wasn't rewritten in the meantime. On
    /// error the slots not yet applied stay buffered.
    pub fn merge(&self) -> Result<MergeStats> {
        let _guard = self.merge_lock.lock();
        self.merge_locked()
    }

    fn merge_locked(&self) -> Result<MergeStats> {
        let pending = self.buffer.snapshot();
        let mut stats = MergeStats::default();

        for (key, entry, seq) in pending {
            let applied = match &entry {
                BufferEntry::Value(value) => self
                    .backing
                    .put(key.clone(), value.clone())
                    .map(|_| stats.entries_written += 1),
                BufferEntry::Tombstone => self
                    .backing
                    .remove(&key)
                    .map(|_| stats.tombstones_applied += 1),
            };

            if let Err(e) = applied {
                return Err(AoError::MergeFailed {
                    map: self.backing.name().to_string(),
                    reason: e.to_string(),
                });
            }

            if !self.buffer.remove_if_unchanged(&key, seq) {
                stats.superseded += 1;
            }
        }

        if stats.total() > 0 {
            tracing::trace!(
                "Merged {} writes and {} deletes into map {:?}",
                stats.entries_written,
                stats.tombstones_applied,
                self.backing.name()
            );
        }

        Ok(stats)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AoError::MapClosed(self.backing.name().to_string()));
        }
        Ok(())
    }

    fn resolve(&self, buffered: Option<BufferEntry>, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match buffered {
            Some(BufferEntry::Value(value)) => Ok(Some(value)),
            Some(BufferEntry::Tombstone) => Ok(None),
            None => self.backing.get(key),
        }
    }
}

impl StorageMap for BufferedMap {
    fn name(&self) -> &str {
        self.backing.name()
    }

    fn id(&self) -> MapId {
        self.backing.id()
    }

    /// Buffer first, then backing
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let buffered = self.buffer.get(key);
        self.resolve(buffered, key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        check_key(self.key_type.as_ref(), &key)?;
        check_value(self.value_type.as_ref(), &value)?;

        self.buffer
            .put_resolving(key, value, |key| self.backing.get(key))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.buffer
            .delete_resolving(key.to_vec(), |key| self.backing.get(key))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Backing entries with the buffer laid over them
    fn entries(&self) -> Result<Vec<Entry>> {
        self.ensure_open()?;
        let _guard = self.merge_lock.lock();

        let mut merged =
            SortedEntries::from_unsorted(Arc::clone(&self.key_type), self.backing.entries()?);
        for (key, entry, _) in self.buffer.snapshot() {
            match entry {
                BufferEntry::Value(value) => {
                    merged.insert(key, value);
                }
                BufferEntry::Tombstone => {
                    merged.remove(&key);
                }
            }
        }
        Ok(merged.to_vec())
    }

    /// Merge, then save the backing map
    fn save(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.merge()?;
        self.backing.save()
    }

    /// Drain, then close the backing map.
    ///
    /// Writes are refused while the final merge runs. If the merge or the
    /// backing close fails the map reopens, keeping what is still buffered,
    /// and a later `close` tries again.
    fn close(&self) -> Result<()> {
        let _guard = self.merge_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let drained = self.merge_locked().and_then(|_| self.backing.close());
        if let Err(e) = drained {
            self.closed.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }
}

impl Mergeable for BufferedMap {
    fn label(&self) -> &str {
        self.backing.name()
    }

    fn merge(&self) -> Result<MergeStats> {
        BufferedMap::merge(self)
    }
}

/// Builds a [`BufferedMap`] over a fresh [`DirectMap`].
///
/// The direct map goes into the storage live-set (flushing), the buffered
/// map into the buffered live-set (merging).
pub struct BufferedMapBuilder {
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
}

impl BufferedMapBuilder {
    pub fn new(key_type: Arc<dyn DataType>, value_type: Arc<dyn DataType>) -> Self {
        Self {
            key_type,
            value_type,
        }
    }
}

impl MapBuilder for BufferedMapBuilder {
    type Map = BufferedMap;

    fn open_map(self, config: MapConfig, live: &Arc<LiveSets>) -> Result<Arc<BufferedMap>> {
        let backing = Arc::new(DirectMap::open(
            &config,
            Arc::clone(&self.key_type),
            Arc::clone(&self.value_type),
        )?);
        let map = Arc::new(BufferedMap::new(
            backing.clone(),
            self.key_type,
            self.value_type,
        ));

        live.add_storage_map(backing);
        live.add_buffered_map(map.clone());
        Ok(map)
    }
}
