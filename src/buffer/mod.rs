//! Buffer Module
//!
//! Write buffering in front of a backing map.
//!
//! ## Responsibilities
//! - Absorb foreground writes in memory ([`WriteBuffer`])
//! - Serve reads as buffer-over-backing ([`BufferedMap`])
//! - Drain the buffer into the backing map on merge, in key order
//!
//! ## Merge Protocol
//! A merge copies a snapshot of the buffer into the backing map first and
//! only then drops each copied slot from the buffer, and only if nobody
//! rewrote it meanwhile. A reader therefore always finds a key in at least
//! one of the two places, and re-running a merge that failed halfway just
//! rewrites the same values.

mod map;
mod table;

use crate::error::Result;

pub use map::{BufferedMap, BufferedMapBuilder};
pub use table::WriteBuffer;

/// Entry stored in the write buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

/// Counters from one merge run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Values written into the backing map
    pub entries_written: usize,

    /// Deletes applied to the backing map
    pub tombstones_applied: usize,

    /// Slots rewritten during the merge; they stay buffered for the next run
    pub superseded: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.entries_written + self.tombstones_applied
    }
}

/// A schedulable unit of merge work
pub trait Mergeable: Send + Sync {
    /// Label for logging
    fn label(&self) -> &str;

    /// Drain pending writes into durable structure
    fn merge(&self) -> Result<MergeStats>;
}
