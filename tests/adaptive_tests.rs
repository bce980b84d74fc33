//! Tests for adaptive maps
//!
//! These tests verify:
//! - Mode switching driven by the read/write mix
//! - Buffered-set membership follows the mode
//! - No write is lost across a switch, including under concurrent writers
//! - Readers never see a stored key vanish while the mode flips
//! - The windowed meter and the switching policy

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aostore::adaptive::{AdaptiveMapBuilder, AdaptivePolicy};
use aostore::{
    AccessMeter, AdaptiveMap, Config, DataType, Engine, LongType, MapKind, MapMode, MapOptions,
    StorageMap, WindowedMeter,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// Meter reporting whatever percentages the test sets
#[derive(Default)]
struct FixedMeter {
    read: AtomicU32,
    write: AtomicU32,
}

impl FixedMeter {
    fn new(read: u32, write: u32) -> Arc<Self> {
        let meter = Arc::new(Self::default());
        meter.set(read, write);
        meter
    }

    fn set(&self, read: u32, write: u32) {
        self.read.store(read, Ordering::SeqCst);
        self.write.store(write, Ordering::SeqCst);
    }
}

impl AccessMeter for FixedMeter {
    fn record_read(&self) {}

    fn record_write(&self) {}

    fn read_percent(&self) -> u32 {
        self.read.load(Ordering::SeqCst)
    }

    fn write_percent(&self) -> u32 {
        self.write.load(Ordering::SeqCst)
    }
}

fn setup_engine() -> Engine {
    let config = Config::builder()
        .in_memory(true)
        .background_interval(Duration::from_secs(3600))
        .build();
    Engine::open(config).unwrap()
}

fn longs() -> Arc<dyn DataType> {
    Arc::new(LongType)
}

fn open_metered(engine: &Engine, name: &str, meter: Arc<FixedMeter>) -> Arc<AdaptiveMap> {
    let builder = AdaptiveMapBuilder::new(longs(), longs()).access_meter(meter);
    engine.open_map_with(name, builder).unwrap()
}

// =============================================================================
// Mode Switching
// =============================================================================

#[test]
fn test_adaptive_map_starts_direct() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("fresh", longs(), longs()).unwrap();

    assert_eq!(map.mode(), MapMode::Direct);
    assert!(engine.live_sets().buffered_maps().is_empty());
}

#[test]
fn test_write_heavy_map_switches_to_buffered() {
    let engine = setup_engine();
    let map = open_metered(&engine, "writes", FixedMeter::new(20, 60));

    let report = engine.run_background_tick();

    assert_eq!(map.mode(), MapMode::Buffered);
    assert_eq!(report.switched_to_buffered, 1);
    assert_eq!(engine.live_sets().buffered_maps().len(), 1);
}

#[test]
fn test_read_heavy_map_switches_back_to_direct() {
    let engine = setup_engine();
    let meter = FixedMeter::new(20, 60);
    let map = open_metered(&engine, "mixed", Arc::clone(&meter));

    engine.run_background_tick();
    assert_eq!(map.mode(), MapMode::Buffered);

    map.put(LongType::encode(1), LongType::encode(11)).unwrap();
    assert_eq!(map.pending_count(), 1);

    meter.set(80, 10);
    let report = engine.run_background_tick();

    assert_eq!(map.mode(), MapMode::Direct);
    assert_eq!(report.switched_to_direct, 1);
    assert!(engine.live_sets().buffered_maps().is_empty());
    assert_eq!(map.pending_count(), 0);
    assert_eq!(
        map.backing().get(&LongType::encode(1)).unwrap(),
        Some(LongType::encode(11))
    );
}

#[test]
fn test_balanced_mix_keeps_mode() {
    let engine = setup_engine();
    let meter = FixedMeter::new(40, 40);
    let map = open_metered(&engine, "balanced", Arc::clone(&meter));

    let report = engine.run_background_tick();
    assert_eq!(map.mode(), MapMode::Direct);
    assert_eq!(report.switched_to_buffered + report.switched_to_direct, 0);

    meter.set(0, 100);
    engine.run_background_tick();
    meter.set(50, 50);
    engine.run_background_tick();
    assert_eq!(map.mode(), MapMode::Buffered);
}

#[test]
fn test_read_heavy_direct_map_stays_direct() {
    let engine = setup_engine();
    let map = open_metered(&engine, "reads", FixedMeter::new(80, 10));

    let report = engine.run_background_tick();

    assert_eq!(map.mode(), MapMode::Direct);
    assert_eq!(report.switched_to_direct, 0);
}

#[test]
fn test_switch_calls_are_idempotent() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("manual", longs(), longs()).unwrap();

    assert!(map.switch_to_buffered_map().unwrap());
    assert!(!map.switch_to_buffered_map().unwrap());
    assert_eq!(engine.live_sets().buffered_maps().len(), 1);

    assert!(map.switch_to_direct_map().unwrap());
    assert!(!map.switch_to_direct_map().unwrap());
    assert!(engine.live_sets().buffered_maps().is_empty());
}

#[test]
fn test_open_map_passes_access_meter() {
    let engine = setup_engine();
    let meter = FixedMeter::new(0, 90);

    engine
        .open_map(
            "opts",
            MapKind::Adaptive,
            longs(),
            longs(),
            MapOptions::default().access_meter(meter),
        )
        .unwrap();

    let report = engine.run_background_tick();
    assert_eq!(report.switched_to_buffered, 1);
}

#[test]
fn test_custom_threshold() {
    let config = Config::builder()
        .in_memory(true)
        .background_interval(Duration::from_secs(3600))
        .adaptive_threshold(70)
        .build();
    let engine = Engine::open(config).unwrap();
    let meter = FixedMeter::new(20, 60);
    let map = open_metered(&engine, "strict", Arc::clone(&meter));

    engine.run_background_tick();
    assert_eq!(map.mode(), MapMode::Direct);

    meter.set(20, 75);
    engine.run_background_tick();
    assert_eq!(map.mode(), MapMode::Buffered);
}

// =============================================================================
// Consistency Across Switches
// =============================================================================

#[test]
fn test_switch_to_direct_loses_no_writes() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("drain", longs(), longs()).unwrap();

    map.switch_to_buffered_map().unwrap();
    for i in 0..100 {
        map.put(LongType::encode(i), LongType::encode(i)).unwrap();
    }
    for i in 0..10 {
        map.remove(&LongType::encode(i)).unwrap();
    }
    map.switch_to_direct_map().unwrap();

    assert_eq!(map.len().unwrap(), 90);
    assert_eq!(map.backing().len().unwrap(), 90);
    assert_eq!(map.get(&LongType::encode(5)).unwrap(), None);
    assert_eq!(
        map.get(&LongType::encode(50)).unwrap(),
        Some(LongType::encode(50))
    );
}

#[test]
fn test_concurrent_writers_across_switches() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("busy", longs(), longs()).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..250 {
                    let key = t * 1000 + i;
                    map.put(LongType::encode(key), LongType::encode(key)).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..20 {
        map.switch_to_buffered_map().unwrap();
        thread::yield_now();
        map.switch_to_direct_map().unwrap();
    }

    for writer in writers {
        writer.join().unwrap();
    }
    map.switch_to_direct_map().unwrap();

    assert_eq!(map.len().unwrap(), 1000);
    assert_eq!(map.backing().len().unwrap(), 1000);
}

#[test]
fn test_readers_never_miss_keys_across_switches() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("flipping", longs(), longs()).unwrap();
    for i in 0..100 {
        map.put(LongType::encode(i), LongType::encode(i)).unwrap();
    }
    map.switch_to_buffered_map().unwrap();
    for i in 100..200 {
        map.put(LongType::encode(i), LongType::encode(i)).unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let map = Arc::clone(&map);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    for i in 0..200 {
                        let key = LongType::encode(i);
                        assert!(map.get(&key).unwrap().is_some(), "key {} missing", i);
                    }
                }
            })
        })
        .collect();

    let writer = {
        let map = Arc::clone(&map);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0;
            while !stop.load(Ordering::SeqCst) {
                for i in 0..200 {
                    map.put(LongType::encode(i), LongType::encode(round)).unwrap();
                }
                round += 1;
            }
        })
    };

    for _ in 0..50 {
        map.switch_to_direct_map().unwrap();
        thread::yield_now();
        map.switch_to_buffered_map().unwrap();
        thread::yield_now();
    }
    stop.store(true, Ordering::SeqCst);

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    map.switch_to_direct_map().unwrap();
    assert_eq!(map.backing().len().unwrap(), 200);
}

#[test]
fn test_reads_see_buffered_writes() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("overlay", longs(), longs()).unwrap();

    map.put(LongType::encode(1), LongType::encode(1)).unwrap();
    map.switch_to_buffered_map().unwrap();
    map.put(LongType::encode(1), LongType::encode(2)).unwrap();
    map.put(LongType::encode(3), LongType::encode(3)).unwrap();

    assert_eq!(map.get(&LongType::encode(1)).unwrap(), Some(LongType::encode(2)));
    assert_eq!(
        map.backing().get(&LongType::encode(1)).unwrap(),
        Some(LongType::encode(1))
    );
    assert_eq!(map.len().unwrap(), 2);
}

// =============================================================================
// Meter and Policy
// =============================================================================

#[test]
fn test_windowed_meter_percentages() {
    let meter = WindowedMeter::new();
    assert_eq!(meter.read_percent(), 0);
    assert_eq!(meter.write_percent(), 0);

    for _ in 0..3 {
        meter.record_read();
    }
    meter.record_write();

    assert_eq!(meter.read_percent(), 75);
    assert_eq!(meter.write_percent(), 25);

    meter.reset();
    assert_eq!(meter.reads(), 0);
    assert_eq!(meter.writes(), 0);
}

#[test]
fn test_windowed_meter_counts_map_traffic() {
    let engine = setup_engine();
    let map = engine.open_adaptive_map("counted", longs(), longs()).unwrap();

    for i in 0..10 {
        map.put(LongType::encode(i), LongType::encode(i)).unwrap();
    }
    assert_eq!(map.write_percent(), 100);

    let report = engine.run_background_tick();
    assert_eq!(report.switched_to_buffered, 1);
    assert_eq!(map.write_percent(), 0);

    for i in 0..10 {
        map.get(&LongType::encode(i)).unwrap();
    }
    let report = engine.run_background_tick();
    assert_eq!(report.switched_to_direct, 1);
    assert_eq!(map.mode(), MapMode::Direct);
}

#[test]
fn test_policy_decisions() {
    let policy = AdaptivePolicy::default();

    assert_eq!(policy.threshold(), 50);
    assert_eq!(policy.decide(80, 10), Some(MapMode::Direct));
    assert_eq!(policy.decide(20, 60), Some(MapMode::Buffered));
    assert_eq!(policy.decide(40, 40), None);
    assert_eq!(policy.decide(50, 50), None);
    assert_eq!(policy.decide(60, 60), Some(MapMode::Direct));
}
