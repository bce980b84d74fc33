//! Mode switch policy

use super::MapMode;

/// Threshold policy for adaptive maps
///
/// A read share above the threshold wins over a write share above it; there
/// is no hysteresis, so a map hovering around the threshold may switch on
/// every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptivePolicy {
    threshold: u32,
}

impl AdaptivePolicy {
    pub const DEFAULT_THRESHOLD: u32 = 50;

    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Mode the map should be in, or `None` to leave it alone
    pub fn decide(&self, read_percent: u32, write_percent: u32) -> Option<MapMode> {
        if read_percent > self.threshold {
            Some(MapMode::Direct)
        } else if write_percent > self.threshold {
            Some(MapMode::Buffered)
        } else {
            None
        }
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
