//! Engine Module
//!
//! The map registry for one storage location.
//!
//! ## Responsibilities
//! - Recover map ids from existing artifacts on startup
//! - Open maps by name and kind, exactly once per name
//! - Own every map it opened: commit saves them, close closes them
//! - Run the background scheduler over this engine's live-sets

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adaptive::{AdaptiveMap, AdaptiveMapBuilder, AdaptivePolicy};
use crate::background::{BackgroundScheduler, BackgroundTasks, LiveSets, MergePool, TickReport};
use crate::buffer::{BufferedMap, BufferedMapBuilder};
use crate::codec::DataType;
use crate::config::Config;
use crate::error::{AoError, Result};
use crate::map::{
    DirectMap, DirectMapBuilder, MapBuilder, MapConfig, MapId, MapKind, MapOptions, MemoryMap,
    MemoryMapBuilder, StorageMap,
};
use crate::storage::{validate_map_name, IdAllocator};

/// One opened map: the same allocation viewed as a backend and as `Any`
struct OpenMap {
    map: Arc<dyn StorageMap>,
    any: Arc<dyn Any + Send + Sync>,
}

impl OpenMap {
    fn new<M: StorageMap + 'static>(map: Arc<M>) -> Self {
        Self {
            map: map.clone(),
            any: map,
        }
    }

    fn downcast<M: StorageMap + 'static>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.any).downcast::<M>().ok()
    }
}

/// Everything mutated only inside the lifecycle critical section
struct EngineState {
    maps: HashMap<String, OpenMap>,
    ids: IdAllocator,
    closed: bool,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Lifecycle** (open/commit/close): serialized by the `state` mutex.
///   Two threads opening the same name get the same map; the second waits
///   for the first to finish constructing it.
/// - **Map access**: callers use the returned handles directly; the engine
///   isn't involved and takes no lock.
/// - **Background**: the scheduler thread sees maps only through this
///   engine's `LiveSets`, never through `state`.
///
/// Nothing here is process-global. Engines share a merge pool only when it
/// is handed to each of them via [`Engine::open_with_pool`].
pub struct Engine {
    config: Config,

    /// `None` for in-memory engines
    storage_dir: Option<PathBuf>,

    state: Mutex<EngineState>,
    live: Arc<LiveSets>,
    tasks: Arc<BackgroundTasks>,
    scheduler: BackgroundScheduler,
}

impl Engine {
    /// Open an engine with its own merge pool
    pub fn open(config: Config) -> Result<Self> {
        let pool = Arc::new(MergePool::new(config.merge_workers)?);
        Self::open_with_pool(config, pool)
    }

    /// Open an engine whose merge phase runs on `pool`
    ///
    /// On startup:
    /// 1. Create the storage directory if missing (persistent engines only)
    /// 2. Recover map ids from the artifacts in it
    /// 3. Start the background scheduler
    pub fn open_with_pool(config: Config, pool: Arc<MergePool>) -> Result<Self> {
        let storage_dir = config.storage_dir().cloned();

        let ids = match &storage_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                IdAllocator::recover(dir, config.recovery_policy)?
            }
            None => IdAllocator::new(),
        };

        let live = Arc::new(LiveSets::new());
        let tasks = Arc::new(BackgroundTasks::new(
            Arc::clone(&live),
            pool,
            AdaptivePolicy::new(config.adaptive_threshold),
        ));
        let scheduler = BackgroundScheduler::start(Arc::clone(&tasks), config.background_interval)?;

        match &storage_dir {
            Some(dir) => tracing::info!(
                "Engine opened at {} ({} maps on disk, last id {})",
                dir.display(),
                ids.assignments().len(),
                ids.last_id()
            ),
            None => tracing::info!("In-memory engine opened"),
        }

        Ok(Self {
            config,
            storage_dir,
            state: Mutex::new(EngineState {
                maps: HashMap::new(),
                ids,
                closed: false,
            }),
            live,
            tasks,
            scheduler,
        })
    }

    // =========================================================================
    // Opening Maps
    // =========================================================================

    /// Open a map of the given kind, or return the one already open under
    /// `name` (whatever its kind).
    pub fn open_map(
        &self,
        name: &str,
        kind: MapKind,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
        options: MapOptions,
    ) -> Result<Arc<dyn StorageMap>> {
        match kind {
            MapKind::Adaptive => {
                let mut builder = AdaptiveMapBuilder::new(key_type, value_type);
                if let Some(meter) = options.access_meter {
                    builder = builder.access_meter(meter);
                }
                self.open_entry(name, builder)
            }
            MapKind::Direct => self.open_entry(name, DirectMapBuilder::new(key_type, value_type)),
            MapKind::Buffered => {
                self.open_entry(name, BufferedMapBuilder::new(key_type, value_type))
            }
            MapKind::InMemory => {
                self.open_entry(name, MemoryMapBuilder::new(key_type, value_type))
            }
        }
    }

    /// Open a map through any builder.
    ///
    /// Fails with [`AoError::MapKindMismatch`] if `name` is already open as a
    /// different map type.
    pub fn open_map_with<B: MapBuilder>(&self, name: &str, builder: B) -> Result<Arc<B::Map>> {
        validate_map_name(name)?;
        let mut state = self.state.lock();
        let entry = Self::open_locked(&mut state, self, name, builder)?;

        entry.downcast::<B::Map>().ok_or_else(|| AoError::MapKindMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<B::Map>(),
        })
    }

    pub fn open_adaptive_map(
        &self,
        name: &str,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Result<Arc<AdaptiveMap>> {
        self.open_map_with(name, AdaptiveMapBuilder::new(key_type, value_type))
    }

    pub fn open_direct_map(
        &self,
        name: &str,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Result<Arc<DirectMap>> {
        self.open_map_with(name, DirectMapBuilder::new(key_type, value_type))
    }

    pub fn open_buffered_map(
        &self,
        name: &str,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Result<Arc<BufferedMap>> {
        self.open_map_with(name, BufferedMapBuilder::new(key_type, value_type))
    }

    pub fn open_memory_map(
        &self,
        name: &str,
        key_type: Arc<dyn DataType>,
        value_type: Arc<dyn DataType>,
    ) -> Result<Arc<MemoryMap>> {
        self.open_map_with(name, MemoryMapBuilder::new(key_type, value_type))
    }

    fn open_entry<B: MapBuilder>(&self, name: &str, builder: B) -> Result<Arc<dyn StorageMap>> {
        validate_map_name(name)?;
        let mut state = self.state.lock();
        let entry = Self::open_locked(&mut state, self, name, builder)?;
        Ok(Arc::clone(&entry.map))
    }

    /// Existing entry for `name`, or a new one built by `builder`.
    /// Caller holds the state lock.
    fn open_locked<'s, B: MapBuilder>(
        state: &'s mut EngineState,
        engine: &Engine,
        name: &str,
        builder: B,
    ) -> Result<&'s OpenMap> {
        if state.closed {
            return Err(AoError::EngineClosed);
        }

        if !state.maps.contains_key(name) {
            let id = state.ids.id_for(name)?;
            let config = MapConfig {
                name: name.to_string(),
                id,
                storage_dir: engine.storage_dir.clone(),
                options: engine.config.options.clone(),
            };

            let map = builder.open_map(config, &engine.live)?;
            tracing::debug!(
                "Opened map {:?} as {} (id {})",
                name,
                std::any::type_name::<B::Map>(),
                id
            );
            state.maps.insert(name.to_string(), OpenMap::new(map));
        }

        state
            .maps
            .get(name)
            .ok_or_else(|| AoError::InvalidMapName(name.to_string()))
    }

    // =========================================================================
    // Registry Queries
    // =========================================================================

    pub fn has_map(&self, name: &str) -> bool {
        self.state.lock().maps.contains_key(name)
    }

    pub fn map_names(&self) -> BTreeSet<String> {
        self.state.lock().maps.keys().cloned().collect()
    }

    pub fn maps(&self) -> Vec<Arc<dyn StorageMap>> {
        self.state
            .lock()
            .maps
            .values()
            .map(|entry| Arc::clone(&entry.map))
            .collect()
    }

    /// Id assigned to `name`, recovered or allocated; doesn't allocate
    pub fn map_id(&self, name: &str) -> Option<MapId> {
        self.state.lock().ids.assigned(name)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Save every map this engine opened.
    ///
    /// Every map is attempted; the first failure is returned.
    pub fn commit(&self) -> Result<()> {
        let state = self.state.lock();
        if state.closed {
            return Err(AoError::EngineClosed);
        }

        let mut first_error = None;
        for (name, entry) in state.maps.iter() {
            if let Err(e) = entry.map.save() {
                tracing::error!("Commit of map {:?} failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop the scheduler, then save and close every map.
    ///
    /// Only this engine's maps and live-sets are touched. Calling `close`
    /// again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        self.scheduler.stop();

        let mut first_error = None;
        let count = state.maps.len();
        for (name, entry) in state.maps.drain() {
            if let Err(e) = entry.map.close() {
                tracing::error!("Closing map {:?} failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        self.live.clear();
        state.ids.clear();

        tracing::info!("Engine closed ({} maps)", count);
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Run one background tick on the calling thread
    pub fn run_background_tick(&self) -> TickReport {
        self.tasks.run_tick()
    }

    // =========================================================================
    // Extension Points (accepted, no effect yet)
    // =========================================================================

    pub fn backup_to(&self, _path: impl AsRef<Path>) -> Result<()> {
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        Ok(())
    }

    pub fn init_transactions(&self) -> Result<()> {
        Ok(())
    }

    pub fn remove_temporary_maps(&self, _ids: &BTreeSet<MapId>) -> Result<()> {
        Ok(())
    }

    pub fn close_immediately(&self) -> Result<()> {
        Ok(())
    }

    pub fn next_temporary_map_name(&self) -> Option<String> {
        None
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage directory, if this engine persists
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// The live-sets this engine's scheduler walks
    pub fn live_sets(&self) -> &Arc<LiveSets> {
        &self.live
    }

    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.scheduler
    }

    /// Ticks the background thread has completed
    pub fn background_ticks(&self) -> u64 {
        self.scheduler.ticks_completed()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Closing engine on drop failed: {}", e);
        }
    }
}
