//! Storage Module
//!
//! On-disk side of the engine: how map artifacts are named, how ids are
//! recovered from them, and the map file format itself.
//!
//! ## Responsibilities
//! - Name artifacts `{map_name}-{map_id}.db`
//! - Recover the name → id table and the id counter on startup
//! - Write and read whole-map snapshots with checksums
//!
//! ## File Format (V1)
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                  │
//! │ ┌──────────┬──────────┬────────┬───────┬─────────┐ │
//! │ │Magic (4) │Version(2)│ Id (4) │CRC (4)│ Len (8) │ │
//! │ └──────────┴──────────┴────────┴───────┴─────────┘ │
//! ├────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                  │
//! │   map name + entries in key order                  │
//! └────────────────────────────────────────────────────┘
//! ```

mod catalog;
mod file;

pub use catalog::{
    artifact_file_name, parse_artifact_name, validate_map_name, IdAllocator,
    MAP_NAME_ID_SEPARATOR, SUFFIX_AO_FILE, SUFFIX_TEMP_FILE,
};
pub use file::{MapFile, HEADER_SIZE};
