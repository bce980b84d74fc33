//! Map Module
//!
//! The backend contract every map kind implements, plus the two plain
//! backends (direct and in-memory) the other kinds are layered on.
//!
//! ## Responsibilities
//! - Define [`StorageMap`], the object-safe interface the engine and the
//!   background scheduler drive maps through
//! - Define map identity ([`MapId`]) and the closed set of map kinds
//! - Define [`MapBuilder`], how the engine constructs a map of some kind
//!
//! ## Layering
//! ```text
//! AdaptiveMap ──► BufferedMap ──► DirectMap ──► {storage}/{name}-{id}.db
//!      │                             ▲
//!      └─────────────────────────────┘   (direct mode)
//! ```

mod direct;
mod memory;
mod sorted;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adaptive::AccessMeter;
use crate::background::LiveSets;
use crate::error::Result;
use crate::storage::artifact_file_name;

pub use direct::{DirectMap, DirectMapBuilder};
pub use memory::{MemoryMap, MemoryMapBuilder};
pub(crate) use sorted::SortedEntries;

/// Encoded key/value pair as yielded by [`StorageMap::entries`]
pub type Entry = (Vec<u8>, Vec<u8>);

// =============================================================================
// Identity
// =============================================================================

/// Durable per-engine map identifier
///
/// Encoded into the map's artifact name, so it survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapId(pub u32);

impl MapId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of map the engine can construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapKind {
    /// Switches between buffered and direct writes by access mix
    #[default]
    Adaptive,

    /// Plain sorted map, persisted
    Direct,

    /// Writes always buffered, merged in the background
    Buffered,

    /// Plain sorted map, never persisted
    InMemory,
}

impl MapKind {
    /// Resolve a caller-supplied kind tag.
    ///
    /// Matching is case-insensitive. An absent or unrecognized tag resolves
    /// to [`MapKind::Adaptive`].
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return MapKind::Adaptive;
        };

        match tag.trim().to_ascii_lowercase().as_str() {
            "adaptive" | "aomap" => MapKind::Adaptive,
            "direct" | "btree" | "btreemap" => MapKind::Direct,
            "buffered" | "bufferedmap" => MapKind::Buffered,
            "inmemory" | "memory" | "memorymap" => MapKind::InMemory,
            other => {
                tracing::debug!("Unknown map kind tag {:?}, using adaptive", other);
                MapKind::Adaptive
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MapKind::Adaptive => "adaptive",
            MapKind::Direct => "direct",
            MapKind::Buffered => "buffered",
            MapKind::InMemory => "inmemory",
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Backend Contract
// =============================================================================

/// A named, sorted map of encoded keys to encoded values.
///
/// All methods take `&self`; implementations synchronize internally so one
/// map can be shared between foreground callers and the background
/// scheduler.
pub trait StorageMap: Send + Sync {
    /// Map name, unique within its engine
    fn name(&self) -> &str;

    /// Durable id assigned by the engine
    fn id(&self) -> MapId;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or replace, returning the previous value
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Option<Vec<u8>>>;

    /// Remove, returning the previous value
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of live entries
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of all live entries in key order
    fn entries(&self) -> Result<Vec<Entry>>;

    /// Make the current contents durable. A no-op for maps that don't persist.
    fn save(&self) -> Result<()>;

    /// Save, then reject further reads and writes
    fn close(&self) -> Result<()>;
}

// =============================================================================
// Construction
// =============================================================================

/// Per-map configuration handed to a [`MapBuilder`]
#[derive(Debug, Clone)]
pub struct MapConfig {
    pub name: String,

    /// Recovered id, or a freshly allocated one
    pub id: MapId,

    /// Engine storage directory; `None` for in-memory engines
    pub storage_dir: Option<PathBuf>,

    /// Engine pass-through options
    pub options: HashMap<String, String>,
}

impl MapConfig {
    /// Where this map's artifact lives, if the engine persists
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(artifact_file_name(&self.name, self.id)))
    }
}

/// Constructs one kind of map.
///
/// The engine supplies name, id and storage location in [`MapConfig`], and
/// its live-sets so the builder can register whatever the background
/// scheduler has to see (storage maps for flushing, mergeable units, adaptive
/// maps).
pub trait MapBuilder {
    type Map: StorageMap + 'static;

    fn open_map(self, config: MapConfig, live: &Arc<LiveSets>) -> Result<Arc<Self::Map>>;
}

/// Per-open options for [`crate::Engine::open_map`]
#[derive(Clone, Default)]
pub struct MapOptions {
    /// Access meter for adaptive maps; a windowed counter when unset
    pub access_meter: Option<Arc<dyn AccessMeter>>,
}

impl MapOptions {
    pub fn access_meter(mut self, meter: Arc<dyn AccessMeter>) -> Self {
        self.access_meter = Some(meter);
        self
    }
}

impl fmt::Debug for MapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapOptions")
            .field("access_meter", &self.access_meter.is_some())
            .finish()
    }
}
