//! Adaptive map
//!
//! Stable map handle whose delegate is either the backing map itself or a
//! [`BufferedMap`] over it.
//!
//! ## Switch Protocol
//! The delegate sits behind one RwLock. Every foreground operation holds the
//! read side for its whole duration; a switch takes the write side, which
//! stops new operations from starting and waits out the ones in flight.
//! Leaving buffered mode drains the buffer under that same write guard, so
//! no write is stranded in a buffer nobody reads any more.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::background::LiveSets;
use crate::buffer::{BufferedMap, Mergeable};
use crate::codec::DataType;
use crate::error::{AoError, Result};
use crate::map::{DirectMap, Entry, MapBuilder, MapConfig, MapId, StorageMap};

use super::{AccessMeter, MapMode, WindowedMeter};

enum Delegate {
    Direct,
    Buffered(Arc<BufferedMap>),
}

pub struct AdaptiveMap {
    backing: Arc<dyn StorageMap>,
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
    delegate: RwLock<Delegate>,
    meter: Arc<dyn AccessMeter>,

    /// Owning engine's live-sets; a buffered delegate is registered there
    live: Weak<LiveSets>,
}

impl AdaptiveMap {
    /// Wrap `backing`, starting in direct mode
    pub fn new(
        backing: Arc<dyn StorageMap>,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
        meter: Arc<dyn AccessMeter>,
        live: &Arc<LiveSets>,
    ) -> Self {
        Self {
            backing,
            key_type,
            value_type,
            delegate: RwLock::new(Delegate::Direct),
            meter,
            live: Arc::downgrade(live),
        }
    }

    pub fn mode(&self) -> MapMode {
        match &*self.delegate.read() {
            Delegate::Direct => MapMode::Direct,
            Delegate::Buffered(_) => MapMode::Buffered,
        }
    }

    pub fn read_percent(&self) -> u32 {
        self.meter.read_percent()
    }

    pub fn write_percent(&self) -> u32 {
        self.meter.write_percent()
    }

    /// Start a new access measurement window
    pub fn reset_access_window(&self) {
        self.meter.reset();
    }

    pub fn backing(&self) -> &Arc<dyn StorageMap> {
        &self.backing
    }

    /// Writes buffered but not yet merged (0 in direct mode)
    pub fn pending_count(&self) -> usize {
        match &*self.delegate.read() {
            Delegate::Direct => 0,
            Delegate::Buffered(buffered) => buffered.pending_count(),
        }
    }

    /// Route writes through a new buffered map.
    ///
    /// Returns `Ok(false)` if the map is already buffered.
    pub fn switch_to_buffered_map(&self) -> Result<bool> {
        let mut delegate = self.delegate.write();
        if matches!(*delegate, Delegate::Buffered(_)) {
            return Ok(false);
        }

        let live = self.live.upgrade().ok_or(AoError::EngineClosed)?;
        let buffered = Arc::new(BufferedMap::new(
            Arc::clone(&self.backing),
            Arc::clone(&self.key_type),
            Arc::clone(&self.value_type),
        ));
        live.add_buffered_map(buffered.clone());
        *delegate = Delegate::Buffered(buffered);

        tracing::debug!("Map {:?} switched to buffered mode", self.backing.name());
        Ok(true)
    }

    /// Drain the buffer and route writes straight to the backing map.
    ///
    /// Returns `Ok(false)` if the map is already direct. If the drain fails
    /// the map stays buffered and nothing is lost.
    pub fn switch_to_direct_map(&self) -> Result<bool> {
        let mut delegate = self.delegate.write();
        let Delegate::Buffered(buffered) = &*delegate else {
            return Ok(false);
        };

        let stats = buffered.merge()?;
        if let Some(live) = self.live.upgrade() {
            let unit: Arc<dyn Mergeable> = buffered.clone();
            live.remove_buffered_map(&unit);
        }
        *delegate = Delegate::Direct;

        tracing::debug!(
            "Map {:?} switched to direct mode ({} pending writes drained)",
            self.backing.name(),
            stats.total()
        );
        Ok(true)
    }

    fn with_delegate<T>(&self, op: impl FnOnce(&dyn StorageMap) -> Result<T>) -> Result<T> {
        let delegate = self.delegate.read();
        match &*delegate {
            Delegate::Direct => op(self.backing.as_ref()),
            Delegate::Buffered(buffered) => op(buffered.as_ref()),
        }
    }
}

impl StorageMap for AdaptiveMap {
    fn name(&self) -> &str {
        self.backing.name()
    }

    fn id(&self) -> MapId {
        self.backing.id()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.meter.record_read();
        self.with_delegate(|map| map.get(key))
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.meter.record_write();
        self.with_delegate(|map| map.put(key, value))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.meter.record_write();
        self.with_delegate(|map| map.remove(key))
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        self.meter.record_read();
        self.with_delegate(|map| map.contains_key(key))
    }

    fn len(&self) -> Result<usize> {
        self.with_delegate(|map| map.len())
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        self.with_delegate(|map| map.entries())
    }

    fn save(&self) -> Result<()> {
        self.with_delegate(|map| map.save())
    }

    /// Leave buffered mode (draining the buffer), then close the backing map
    fn close(&self) -> Result<()> {
        self.switch_to_direct_map()?;
        self.backing.close()
    }
}

/// Builds an [`AdaptiveMap`] over a fresh [`DirectMap`]
pub struct AdaptiveMapBuilder {
    key_type: Arc<dyn DataType>,
    value_type: Arc<dyn DataType>,
    meter: Option<Arc<dyn AccessMeter>>,
}

impl AdaptiveMapBuilder {
    pub fn new(key_type: Arc<dyn DataType>, value_type: Arc<dyn DataType>) -> Self {
        Self {
            key_type,
            value_type,
            meter: None,
        }
    }

    /// Use `meter` instead of a [`WindowedMeter`]
    pub fn access_meter(mut self, meter: Arc<dyn AccessMeter>) -> Self {
        self.meter = Some(meter);
        self
    }
}

impl MapBuilder for AdaptiveMapBuilder {
    type Map = AdaptiveMap;

    fn open_map(self, config: MapConfig, live: &Arc<LiveSets>) -> Result<Arc<AdaptiveMap>> {
        let backing = Arc::new(DirectMap::open(
            &config,
            Arc::clone(&self.key_type),
            Arc::clone(&self.value_type),
        )?);
        let meter = self
            .meter
            .unwrap_or_else(|| Arc::new(WindowedMeter::new()) as Arc<dyn AccessMeter>);

        let map = Arc::new(AdaptiveMap::new(
            backing.clone(),
            self.key_type,
            self.value_type,
            meter,
            live,
        ));

        live.add_storage_map(backing);
        live.add_adaptive_map(map.clone());
        Ok(map)
    }
}
