//! # aostore
//!
//! An embedded map store with adaptive write buffering:
//! - Named, sorted maps with durable ids recovered from their artifacts
//! - Adaptive maps that buffer writes while write-heavy and write through
//!   while read-heavy
//! - A background scheduler per engine that switches modes, merges buffers
//!   and flushes maps
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │        (map registry, id allocation, commit / close)         │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ open_map                     │ owns
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │  Adaptive / Buffered / │      │  BackgroundScheduler   │
//!   │  Direct / InMemory map │      │  optimize→merge→flush  │
//!   └───────────┬────────────┘      └───────────┬────────────┘
//!               │ registers in                  │ walks
//!               ▼                               ▼
//!        ┌─────────────────────────────────────────────┐
//!        │                  LiveSets                    │
//!        │  storage maps · buffered maps · adaptive maps│
//!        └─────────────────────────────────────────────┘
//!               │
//!               ▼
//!        {storage}/{name}-{id}.db
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod map;
pub mod storage;
pub mod buffer;
pub mod adaptive;
pub mod background;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AoError, Result};
pub use config::{Config, RecoveryPolicy};
pub use engine::Engine;

pub use adaptive::{AccessMeter, AdaptiveMap, MapMode, WindowedMeter};
pub use background::{LiveSets, MergePool, TickReport};
pub use buffer::{BufferedMap, Mergeable};
pub use codec::{BytesType, DataType, LongType, StringType};
pub use map::{DirectMap, MapBuilder, MapId, MapKind, MapOptions, MemoryMap, StorageMap};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of aostore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
