//! Adaptive Module
//!
//! Maps that move their write path between buffered and direct as the
//! observed access mix shifts.
//!
//! ## Responsibilities
//! - Measure read/write mix per map ([`AccessMeter`])
//! - Decide which mode a map should be in ([`AdaptivePolicy`])
//! - Swap a map's delegate without splitting an operation across two
//!   delegates or losing buffered writes ([`AdaptiveMap`])

mod map;
mod meter;
mod policy;

pub use map::{AdaptiveMap, AdaptiveMapBuilder};
pub use meter::{AccessMeter, WindowedMeter};
pub use policy::AdaptivePolicy;

/// Which delegate an adaptive map is currently writing through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Straight into the backing map
    Direct,

    /// Into a write buffer merged in the background
    Buffered,
}
