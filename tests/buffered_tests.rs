//! Tests for buffered maps
//!
//! These tests verify:
//! - Reads consult the buffer before the backing map
//! - Deletes are buffered as tombstones and hide backing entries
//! - Merge drains the buffer into the backing map
//! - Full scans lay the buffer over the backing entries
//! - A failed close keeps the writes and can be retried
//! - Readers and writers stay consistent while merges run

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aostore::buffer::{BufferEntry, WriteBuffer};
use aostore::map::Entry;
use aostore::{
    AoError, BufferedMap, Config, DataType, Engine, LongType, MapId, MemoryMap, StorageMap,
    StringType,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn strings() -> Arc<dyn DataType> {
    Arc::new(StringType)
}

fn setup_buffered() -> (Arc<MemoryMap>, BufferedMap) {
    let backing = Arc::new(MemoryMap::new("backing", MapId(1), strings(), strings()));
    let buffered = BufferedMap::new(backing.clone(), strings(), strings());
    (backing, buffered)
}

fn longs() -> Arc<dyn DataType> {
    Arc::new(LongType)
}

fn setup_buffered_longs() -> (Arc<MemoryMap>, BufferedMap) {
    let backing = Arc::new(MemoryMap::new("backing", MapId(1), longs(), longs()));
    let buffered = BufferedMap::new(backing.clone(), longs(), longs());
    (backing, buffered)
}

fn kv(key: &str, value: &str) -> (Vec<u8>, Vec<u8>) {
    (key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

/// Backing map whose writes fail while `failing` is set
struct FlakyMap {
    inner: MemoryMap,
    failing: AtomicBool,
}

impl FlakyMap {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryMap::new("flaky", MapId(1), strings(), strings()),
            failing: AtomicBool::new(false),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> aostore::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        Ok(())
    }
}

impl StorageMap for FlakyMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn id(&self) -> MapId {
        self.inner.id()
    }

    fn get(&self, key: &[u8]) -> aostore::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> aostore::Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.put(key, value)
    }

    fn remove(&self, key: &[u8]) -> aostore::Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.remove(key)
    }

    fn len(&self) -> aostore::Result<usize> {
        self.inner.len()
    }

    fn entries(&self) -> aostore::Result<Vec<Entry>> {
        self.inner.entries()
    }

    fn save(&self) -> aostore::Result<()> {
        self.inner.save()
    }

    fn close(&self) -> aostore::Result<()> {
        self.inner.close()
    }
}

// =============================================================================
// Write Buffer Tests
// =============================================================================

#[test]
fn test_write_buffer_put_get_delete() {
    let buffer = WriteBuffer::new(strings());

    assert_eq!(buffer.put(b"a".to_vec(), b"1".to_vec()), None);
    assert_eq!(
        buffer.put(b"a".to_vec(), b"2".to_vec()),
        Some(BufferEntry::Value(b"1".to_vec()))
    );
    assert_eq!(buffer.get(b"a"), Some(BufferEntry::Value(b"2".to_vec())));

    buffer.delete(b"a".to_vec());
    assert_eq!(buffer.get(b"a"), Some(BufferEntry::Tombstone));
    assert_eq!(buffer.entry_count(), 1);
}

#[test]
fn test_write_buffer_size_accounting() {
    let buffer = WriteBuffer::new(strings());

    buffer.put(b"key".to_vec(), b"value".to_vec());
    assert_eq!(buffer.size(), 8);

    buffer.put(b"key".to_vec(), b"v".to_vec());
    assert_eq!(buffer.size(), 4);

    buffer.delete(b"key".to_vec());
    assert_eq!(buffer.size(), 3);
}

#[test]
fn test_remove_if_unchanged_keeps_rewritten_slots() {
    let buffer = WriteBuffer::new(strings());
    buffer.put(b"a".to_vec(), b"1".to_vec());
    buffer.put(b"b".to_vec(), b"1".to_vec());

    let snapshot = buffer.snapshot();
    buffer.put(b"b".to_vec(), b"2".to_vec());

    for (key, _, seq) in snapshot {
        buffer.remove_if_unchanged(&key, seq);
    }

    assert_eq!(buffer.get(b"a"), None);
    assert_eq!(buffer.get(b"b"), Some(BufferEntry::Value(b"2".to_vec())));
    assert_eq!(buffer.entry_count(), 1);
}

// =============================================================================
// Read Path Tests
// =============================================================================

#[test]
fn test_buffer_shadows_backing() {
    let (backing, buffered) = setup_buffered();
    backing.put(b"k".to_vec(), b"old".to_vec()).unwrap();

    let previous = buffered.put(b"k".to_vec(), b"new".to_vec()).unwrap();

    assert_eq!(previous, Some(b"old".to_vec()));
    assert_eq!(buffered.get(b"k").unwrap(), Some(b"new".to_vec()));
    assert_eq!(backing.get(b"k").unwrap(), Some(b"old".to_vec()));
}

#[test]
fn test_tombstone_hides_backing_entry() {
    let (backing, buffered) = setup_buffered();
    backing.put(b"k".to_vec(), b"v".to_vec()).unwrap();

    let previous = buffered.remove(b"k").unwrap();

    assert_eq!(previous, Some(b"v".to_vec()));
    assert_eq!(buffered.get(b"k").unwrap(), None);
    assert!(!buffered.contains_key(b"k").unwrap());
    assert_eq!(backing.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_entries_overlay_buffer_on_backing() {
    let (backing, buffered) = setup_buffered();
    backing.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    backing.put(b"b".to_vec(), b"1".to_vec()).unwrap();
    backing.put(b"c".to_vec(), b"1".to_vec()).unwrap();

    buffered.put(b"b".to_vec(), b"2".to_vec()).unwrap();
    buffered.remove(b"c").unwrap();
    buffered.put(b"d".to_vec(), b"2".to_vec()).unwrap();

    assert_eq!(
        buffered.entries().unwrap(),
        vec![kv("a", "1"), kv("b", "2"), kv("d", "2")]
    );
    assert_eq!(buffered.len().unwrap(), 3);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_drains_into_backing() {
    let (backing, buffered) = setup_buffered();
    backing.put(b"gone".to_vec(), b"x".to_vec()).unwrap();

    buffered.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    buffered.put(b"b".to_vec(), b"2".to_vec()).unwrap();
    buffered.remove(b"gone").unwrap();

    let stats = buffered.merge().unwrap();

    assert_eq!(stats.entries_written, 2);
    assert_eq!(stats.tombstones_applied, 1);
    assert_eq!(stats.superseded, 0);
    assert_eq!(buffered.pending_count(), 0);
    assert_eq!(buffered.pending_bytes(), 0);
    assert_eq!(backing.entries().unwrap(), vec![kv("a", "1"), kv("b", "2")]);
}

#[test]
fn test_merge_of_empty_buffer_is_noop() {
    let (_backing, buffered) = setup_buffered();

    let stats = buffered.merge().unwrap();

    assert_eq!(stats.total(), 0);
}

#[test]
fn test_merge_failure_keeps_writes_buffered() {
    let (backing, buffered) = setup_buffered();
    buffered.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    backing.close().unwrap();

    let result = buffered.merge();

    assert!(matches!(result, Err(AoError::MergeFailed { .. })));
    assert_eq!(buffered.pending_count(), 1);
}

#[test]
fn test_buffered_map_in_engine_merges_on_tick() {
    let config = Config::builder()
        .in_memory(true)
        .background_interval(Duration::from_secs(3600))
        .build();
    let engine = Engine::open(config).unwrap();
    let map = engine.open_buffered_map("events", strings(), strings()).unwrap();

    map.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    assert_eq!(map.backing().get(b"a").unwrap(), None);

    let report = engine.run_background_tick();

    assert_eq!(report.merged, 1);
    assert_eq!(map.pending_count(), 0);
    assert_eq!(map.backing().get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_closed_buffered_map_rejects_access() {
    let (backing, buffered) = setup_buffered();
    buffered.put(b"a".to_vec(), b"1".to_vec()).unwrap();

    buffered.close().unwrap();

    assert!(matches!(buffered.get(b"a"), Err(AoError::MapClosed(_))));
    assert!(matches!(
        buffered.put(b"b".to_vec(), b"2".to_vec()),
        Err(AoError::MapClosed(_))
    ));
    // Closing drained the buffer before closing the backing map.
    assert_eq!(buffered.pending_count(), 0);
    assert!(matches!(backing.get(b"a"), Err(AoError::MapClosed(_))));
}

#[test]
fn test_failed_close_keeps_writes_and_retries() {
    let backing = FlakyMap::new();
    let buffered = BufferedMap::new(backing.clone(), strings(), strings());
    buffered.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    buffered.remove(b"b").unwrap();

    backing.set_failing(true);
    assert!(matches!(buffered.close(), Err(AoError::MergeFailed { .. })));

    // Still open, nothing lost.
    assert_eq!(buffered.pending_count(), 2);
    assert_eq!(buffered.get(b"a").unwrap(), Some(b"1".to_vec()));

    backing.set_failing(false);
    buffered.close().unwrap();

    assert_eq!(buffered.pending_count(), 0);
    assert!(matches!(buffered.get(b"a"), Err(AoError::MapClosed(_))));
    assert!(matches!(backing.get(b"a"), Err(AoError::MapClosed(_))));
    buffered.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_readers_never_miss_keys_during_merges() {
    let (backing, buffered) = setup_buffered_longs();
    let buffered = Arc::new(buffered);
    for i in 0..200 {
        backing.put(LongType::encode(i), LongType::encode(0)).unwrap();
        buffered.put(LongType::encode(i + 200), LongType::encode(0)).unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let buffered = Arc::clone(&buffered);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut reads = 0usize;
                while !stop.load(Ordering::SeqCst) || reads == 0 {
                    for i in 0..400 {
                        let key = LongType::encode(i);
                        assert!(buffered.get(&key).unwrap().is_some(), "key {} missing", i);
                        reads += 1;
                    }
                }
                reads
            })
        })
        .collect();

    let writer = {
        let buffered = Arc::clone(&buffered);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 1;
            while !stop.load(Ordering::SeqCst) {
                for i in 0..400 {
                    buffered.put(LongType::encode(i), LongType::encode(round)).unwrap();
                }
                round += 1;
            }
        })
    };

    for _ in 0..200 {
        buffered.merge().unwrap();
        thread::yield_now();
    }
    stop.store(true, Ordering::SeqCst);

    writer.join().unwrap();
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    buffered.merge().unwrap();
    assert_eq!(backing.len().unwrap(), 400);
}

#[test]
fn test_previous_value_is_exact_while_merging() {
    let (_backing, buffered) = setup_buffered_longs();
    let buffered = Arc::new(buffered);
    let stop = Arc::new(AtomicBool::new(false));

    let merger = {
        let buffered = Arc::clone(&buffered);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                buffered.merge().unwrap();
            }
        })
    };

    let key = LongType::encode(1);
    assert_eq!(buffered.put(key.clone(), LongType::encode(0)).unwrap(), None);
    for i in 1..2000 {
        let previous = buffered.put(key.clone(), LongType::encode(i)).unwrap();
        assert_eq!(previous, Some(LongType::encode(i - 1)), "write {}", i);
    }
    assert_eq!(buffered.remove(&key).unwrap(), Some(LongType::encode(1999)));
    assert_eq!(buffered.remove(&key).unwrap(), None);

    stop.store(true, Ordering::SeqCst);
    merger.join().unwrap();
}
