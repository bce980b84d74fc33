//! Write buffer implementation
//!
//! Sorted table with RwLock for concurrency. Every slot carries a sequence
//! number so a merge can tell whether the slot changed after its snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::DataType;
use crate::error::Result;
use crate::map::SortedEntries;

use super::BufferEntry;

#[derive(Debug, Clone)]
struct Slot {
    entry: BufferEntry,
    seq: u64,
}

struct Table {
    slots: SortedEntries<Slot>,

    /// Approximate size in bytes (keys + values)
    size: usize,

    next_seq: u64,
}

/// In-memory buffer for writes not yet merged into the backing map
pub struct WriteBuffer {
    table: RwLock<Table>,
}

impl WriteBuffer {
    /// Create an empty buffer ordered by `key_type`
    pub fn new(key_type: Arc<dyn DataType>) -> Self {
        Self {
            table: RwLock::new(Table {
                slots: SortedEntries::new(key_type),
                size: 0,
                next_seq: 0,
            }),
        }
    }

    /// Buffered state of `key`, if any (read lock)
    pub fn get(&self, key: &[u8]) -> Option<BufferEntry> {
        self.table.read().slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Buffer a value, returning the previously buffered entry (write lock)
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Option<BufferEntry> {
        self.upsert(key, BufferEntry::Value(value))
    }

    /// Buffer a tombstone, returning the previously buffered entry (write lock)
    pub fn delete(&self, key: Vec<u8>) -> Option<BufferEntry> {
        self.upsert(key, BufferEntry::Tombstone)
    }

    /// Buffer a value and return the key's previous visible value.
    ///
    /// With no slot for `key`, `unbuffered` supplies the value from behind
    /// the buffer. It runs under the write lock, before the new slot exists,
    /// so no merge can move anything for `key` in between. If it fails
    /// nothing is buffered.
    pub fn put_resolving(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        unbuffered: impl FnOnce(&[u8]) -> Result<Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        self.upsert_resolving(key, BufferEntry::Value(value), unbuffered)
    }

    /// Buffer a tombstone; see [`WriteBuffer::put_resolving`]
    pub fn delete_resolving(
        &self,
        key: Vec<u8>,
        unbuffered: impl FnOnce(&[u8]) -> Result<Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        self.upsert_resolving(key, BufferEntry::Tombstone, unbuffered)
    }

    fn upsert_resolving(
        &self,
        key: Vec<u8>,
        entry: BufferEntry,
        unbuffered: impl FnOnce(&[u8]) -> Result<Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        let mut table = self.table.write();
        let hidden = match table.slots.get(&key) {
            Some(_) => None,
            None => Some(unbuffered(&key)?),
        };

        let previous = Self::insert_slot(&mut table, key, entry);
        Ok(match (previous, hidden) {
            (Some(BufferEntry::Value(value)), _) => Some(value),
            (Some(BufferEntry::Tombstone), _) => None,
            (None, hidden) => hidden.flatten(),
        })
    }

    fn upsert(&self, key: Vec<u8>, entry: BufferEntry) -> Option<BufferEntry> {
        let mut table = self.table.write();
        Self::insert_slot(&mut table, key, entry)
    }

    fn insert_slot(table: &mut Table, key: Vec<u8>, entry: BufferEntry) -> Option<BufferEntry> {
        table.next_seq += 1;

        let key_len = key.len();
        let added = entry_size(&entry);
        let slot = Slot {
            entry,
            seq: table.next_seq,
        };

        let previous = table.slots.insert(key, slot);
        match &previous {
            Some(old) => table.size = table.size - entry_size(&old.entry) + added,
            None => table.size += key_len + added,
        }
        previous.map(|old| old.entry)
    }

    /// Sorted copy of every slot with its sequence number
    pub fn snapshot(&self) -> Vec<(Vec<u8>, BufferEntry, u64)> {
        self.table
            .read()
            .slots
            .iter()
            .map(|(key, slot)| (key.to_vec(), slot.entry.clone(), slot.seq))
            .collect()
    }

    /// Drop the slot for `key` if it still carries sequence number `seq`.
    ///
    /// Returns false when the slot was rewritten after the snapshot that
    /// produced `seq`; the newer write stays buffered.
    pub fn remove_if_unchanged(&self, key: &[u8], seq: u64) -> bool {
        let mut table = self.table.write();
        match table.slots.remove_if(key, |slot| slot.seq == seq) {
            Some(old) => {
                table.size -= key.len() + entry_size(&old.entry);
                true
            }
            None => false,
        }
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.table.read().size
    }

    pub fn entry_count(&self) -> usize {
        self.table.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().slots.is_empty()
    }
}

fn entry_size(entry: &BufferEntry) -> usize {
    match entry {
        BufferEntry::Value(value) => value.len(),
        BufferEntry::Tombstone => 0,
    }
}
