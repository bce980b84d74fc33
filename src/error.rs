//! Error types for aostore
//!
//! Provides a unified error type for all operations.

use std::num::ParseIntError;

use thiserror::Error;

/// Result type alias using AoError
pub type Result<T> = std::result::Result<T, AoError>;

/// Unified error type for aostore operations
#[derive(Debug, Error)]
pub enum AoError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Map file corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Invalid map name: {0:?}")]
    InvalidMapName(String),

    #[error("Malformed map id in artifact {artifact:?}: {source}")]
    InvalidMapId {
        artifact: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Map {name:?} is already open with a different type than {expected}")]
    MapKindMismatch { name: String, expected: &'static str },

    #[error("Map {0:?} is closed")]
    MapClosed(String),

    #[error("Engine is closed")]
    EngineClosed,

    // -------------------------------------------------------------------------
    // Data Type Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key for {type_name}: {reason}")]
    InvalidKey { type_name: &'static str, reason: String },

    #[error("Invalid value for {type_name}: {reason}")]
    InvalidValue { type_name: &'static str, reason: String },

    // -------------------------------------------------------------------------
    // Background Errors
    // -------------------------------------------------------------------------
    #[error("Merge failed for {map:?}: {reason}")]
    MergeFailed { map: String, reason: String },

    #[error("Merge task panicked: {0}")]
    MergePanicked(String),

    #[error("Merge pool is shut down")]
    PoolShutdown,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for AoError {
    fn from(err: bincode::Error) -> Self {
        AoError::Serialization(err.to_string())
    }
}
