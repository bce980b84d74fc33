//! Map catalog
//!
//! Artifact naming and startup id recovery.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::RecoveryPolicy;
use crate::error::{AoError, Result};
use crate::map::MapId;

/// Separates the map name from its id in an artifact name
pub const MAP_NAME_ID_SEPARATOR: char = '-';

/// Content suffix of a map artifact
pub const SUFFIX_AO_FILE: &str = ".db";

/// Suffix of a half-written artifact (left behind by a crash during save)
pub const SUFFIX_TEMP_FILE: &str = ".tmp";

/// "orders", MapId(5) → "orders-5.db"
pub fn artifact_file_name(name: &str, id: MapId) -> String {
    format!("{name}{MAP_NAME_ID_SEPARATOR}{id}{SUFFIX_AO_FILE}")
}

/// Parse an artifact name into (map name, id).
///
/// Splits at the last separator after stripping the content suffix.
/// Returns `Ok(None)` for names that aren't map artifacts at all (no
/// separator, or a temp file) and an error for a malformed id.
pub fn parse_artifact_name(file_name: &str) -> Result<Option<(String, MapId)>> {
    if file_name.ends_with(SUFFIX_TEMP_FILE) {
        return Ok(None);
    }

    let stem = file_name.strip_suffix(SUFFIX_AO_FILE).unwrap_or(file_name);
    let pos = match stem.rfind(MAP_NAME_ID_SEPARATOR) {
        Some(pos) if pos > 0 => pos,
        _ => return Ok(None),
    };

    let id = stem[pos + 1..]
        .parse::<u32>()
        .map_err(|source| AoError::InvalidMapId {
            artifact: file_name.to_string(),
            source,
        })?;

    Ok(Some((stem[..pos].to_string(), MapId(id))))
}

/// Reject names that couldn't round-trip through an artifact name
pub fn validate_map_name(name: &str) -> Result<()> {
    let reserved = |c: char| c == MAP_NAME_ID_SEPARATOR || c == '/' || c == '\\';

    if name.is_empty() || name.contains(reserved) || name.starts_with('.') {
        return Err(AoError::InvalidMapName(name.to_string()));
    }
    Ok(())
}

/// Per-engine map id allocator
///
/// Holds the name → id assignments (recovered or handed out) and the highest
/// id in use. New names always get `last_id + 1`, so an id recovered from
/// disk is never reused for a different map.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last_id: u32,
    assigned: HashMap<String, MapId>,
}

impl IdAllocator {
    /// Empty allocator; the first new map gets id 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Recover assignments from the artifacts in `dir`
    pub fn recover(dir: &Path, policy: RecoveryPolicy) -> Result<Self> {
        let mut allocator = Self::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                tracing::warn!("Skipping non UTF-8 artifact name {:?}", file_name);
                continue;
            };

            let parsed = match parse_artifact_name(file_name) {
                Ok(parsed) => parsed,
                Err(e) if policy == RecoveryPolicy::Skip => {
                    tracing::warn!("Skipping artifact: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some((name, id)) = parsed {
                allocator.record(name, id);
            }
        }

        tracing::debug!(
            "Recovered {} map ids from {}, last id {}",
            allocator.assigned.len(),
            dir.display(),
            allocator.last_id
        );

        Ok(allocator)
    }

    fn record(&mut self, name: String, id: MapId) {
        self.last_id = self.last_id.max(id.0);

        let kept = match self.assigned.get(&name) {
            Some(&existing) => {
                let kept = existing.max(id);
                tracing::warn!(
                    "Map {:?} has artifacts for ids {} and {}, keeping {}",
                    name,
                    existing,
                    id,
                    kept
                );
                kept
            }
            None => id,
        };
        self.assigned.insert(name, kept);
    }

    /// The id for `name`: its existing assignment, or the next free id
    pub fn id_for(&mut self, name: &str) -> Result<MapId> {
        if let Some(id) = self.assigned.get(name) {
            return Ok(*id);
        }

        self.last_id = self
            .last_id
            .checked_add(1)
            .ok_or_else(|| AoError::Config("map id space exhausted".to_string()))?;

        let id = MapId(self.last_id);
        self.assigned.insert(name.to_string(), id);
        Ok(id)
    }

    /// Existing assignment for `name`, without allocating
    pub fn assigned(&self, name: &str) -> Option<MapId> {
        self.assigned.get(name).copied()
    }

    /// Highest id recovered or handed out
    pub fn last_id(&self) -> MapId {
        MapId(self.last_id)
    }

    /// All assignments, sorted by name
    pub fn assignments(&self) -> Vec<(String, MapId)> {
        let mut all: Vec<_> = self
            .assigned
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        all.sort();
        all
    }

    /// Forget all assignments; the counter keeps its value
    pub fn clear(&mut self) {
        self.assigned.clear();
    }
}
