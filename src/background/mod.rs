//! Background Module
//!
//! The periodic optimize → merge → flush cycle that runs behind every engine.
//!
//! ## Responsibilities
//! - Track which maps the cycle has to visit ([`LiveSets`])
//! - Run merge units in parallel with a per-tick barrier ([`MergePool`])
//! - Drive the tick loop on a dedicated thread ([`BackgroundScheduler`])
//!
//! ## Tick
//! ```text
//!   wait interval (interruptible)
//!         │
//!         ▼
//!   adaptive optimization ── switch each adaptive map by read/write mix
//!         │
//!         ▼
//!   merge ────────────────── one pool task per mergeable, wait for all
//!         │
//!         ▼
//!   flush ────────────────── save every storage map, one after another
//! ```

mod live;
mod pool;
mod scheduler;

pub use live::{LiveSet, LiveSets};
pub use pool::{MergeHandle, MergePool};
pub use scheduler::{BackgroundScheduler, TickReport};
pub(crate) use scheduler::BackgroundTasks;
