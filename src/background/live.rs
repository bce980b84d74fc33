//! Live-sets
//!
//! Copy-on-write membership lists. Iteration works on a snapshot, so a tick
//! walking a set never blocks, or is disturbed by, a map opening concurrently.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::adaptive::AdaptiveMap;
use crate::buffer::Mergeable;
use crate::map::StorageMap;

/// Set of shared handles, compared by identity (allocation address)
pub struct LiveSet<T: ?Sized> {
    members: RwLock<Arc<Vec<Arc<T>>>>,
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<T: ?Sized> LiveSet<T> {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Add `member`; returns false if it was already present
    pub fn insert(&self, member: Arc<T>) -> bool {
        let mut members = self.members.write();
        if members.iter().any(|m| same(m, &member)) {
            return false;
        }

        let mut next = Vec::with_capacity(members.len() + 1);
        next.extend(members.iter().cloned());
        next.push(member);
        *members = Arc::new(next);
        true
    }

    /// Remove `member`; returns false if it wasn't present
    pub fn remove(&self, member: &Arc<T>) -> bool {
        let mut members = self.members.write();
        if !members.iter().any(|m| same(m, member)) {
            return false;
        }

        let next = members
            .iter()
            .filter(|m| !same(m, member))
            .cloned()
            .collect();
        *members = Arc::new(next);
        true
    }

    pub fn contains(&self, member: &Arc<T>) -> bool {
        self.members.read().iter().any(|m| same(m, member))
    }

    /// Current members; later inserts and removes don't affect the snapshot
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.members.read())
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    pub fn clear(&self) {
        *self.members.write() = Arc::new(Vec::new());
    }
}

impl<T: ?Sized> Default for LiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three live-sets one engine's scheduler walks
///
/// - storage maps: saved by the flush phase
/// - buffered maps: merged by the merge phase
/// - adaptive maps: evaluated by the optimization phase
#[derive(Default)]
pub struct LiveSets {
    storage_maps: LiveSet<dyn StorageMap>,
    buffered_maps: LiveSet<dyn Mergeable>,
    adaptive_maps: LiveSet<AdaptiveMap>,
}

impl LiveSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_storage_map(&self, map: Arc<dyn StorageMap>) -> bool {
        self.storage_maps.insert(map)
    }

    pub fn add_buffered_map(&self, map: Arc<dyn Mergeable>) -> bool {
        self.buffered_maps.insert(map)
    }

    pub fn remove_buffered_map(&self, map: &Arc<dyn Mergeable>) -> bool {
        self.buffered_maps.remove(map)
    }

    pub fn add_adaptive_map(&self, map: Arc<AdaptiveMap>) -> bool {
        self.adaptive_maps.insert(map)
    }

    pub fn storage_maps(&self) -> &LiveSet<dyn StorageMap> {
        &self.storage_maps
    }

    pub fn buffered_maps(&self) -> &LiveSet<dyn Mergeable> {
        &self.buffered_maps
    }

    pub fn adaptive_maps(&self) -> &LiveSet<AdaptiveMap> {
        &self.adaptive_maps
    }

    /// Drop every membership (engine close)
    pub fn clear(&self) {
        self.storage_maps.clear();
        self.buffered_maps.clear();
        self.adaptive_maps.clear();
    }
}
