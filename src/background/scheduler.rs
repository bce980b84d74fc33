//! Background scheduler
//!
//! One thread per engine running the optimize → merge → flush tick on a
//! fixed interval.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::adaptive::{AdaptivePolicy, MapMode};
use crate::buffer::Mergeable;
use crate::error::Result;
use crate::map::StorageMap;

use super::pool::panic_message;
use super::{LiveSets, MergeHandle, MergePool};

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub switched_to_direct: usize,
    pub switched_to_buffered: usize,
    pub switch_failures: usize,

    /// Merge units that completed
    pub merged: usize,
    pub merge_failures: usize,

    /// Storage maps saved successfully
    pub flushed: usize,
    pub flush_failures: usize,
}

/// The three phases of a tick, runnable on any thread
pub(crate) struct BackgroundTasks {
    live: Arc<LiveSets>,
    pool: Arc<MergePool>,
    policy: AdaptivePolicy,
}

impl BackgroundTasks {
    pub fn new(live: Arc<LiveSets>, pool: Arc<MergePool>, policy: AdaptivePolicy) -> Self {
        Self { live, pool, policy }
    }

    /// Run one full tick.
    ///
    /// Phases run strictly in order, and the merge phase waits for all of its
    /// units before flushing starts. Errors and panics of a single map are
    /// contained here and counted as that map's failure.
    pub fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        self.adaptive_optimization(&mut report);
        self.merge(&mut report);
        self.flush(&mut report);

        tracing::trace!("Background tick finished: {:?}", report);
        report
    }

    fn adaptive_optimization(&self, report: &mut TickReport) {
        for map in self.live.adaptive_maps().snapshot().iter() {
            let read_percent = map.read_percent();
            let write_percent = map.write_percent();
            map.reset_access_window();

            let Some(target) = self.policy.decide(read_percent, write_percent) else {
                continue;
            };

            let switched = panic::catch_unwind(AssertUnwindSafe(|| match target {
                MapMode::Direct => map.switch_to_direct_map(),
                MapMode::Buffered => map.switch_to_buffered_map(),
            }));

            match switched {
                Ok(Ok(true)) if target == MapMode::Direct => report.switched_to_direct += 1,
                Ok(Ok(true)) => report.switched_to_buffered += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    report.switch_failures += 1;
                    tracing::warn!(
                        "Switching map {:?} to {:?} mode failed: {}",
                        map.name(),
                        target,
                        e
                    );
                }
                Err(payload) => {
                    report.switch_failures += 1;
                    tracing::error!(
                        "Switching map {:?} to {:?} mode panicked: {}",
                        map.name(),
                        target,
                        panic_message(&*payload)
                    );
                }
            }
        }
    }

    fn merge(&self, report: &mut TickReport) {
        let units = self.live.buffered_maps().snapshot();
        let mut handles: Vec<(usize, Result<MergeHandle>)> = Vec::with_capacity(units.len());

        for (idx, unit) in units.iter().enumerate() {
            let unit = Arc::clone(unit);
            handles.push((idx, self.pool.submit(move || unit.merge())));
        }

        // Barrier: every unit of this tick finishes before flushing.
        for (idx, handle) in handles {
            match handle.and_then(MergeHandle::wait) {
                Ok(_) => report.merged += 1,
                Err(e) => {
                    report.merge_failures += 1;
                    tracing::debug!("Ignoring failed merge of {:?}: {}", units[idx].label(), e);
                }
            }
        }
    }

    fn flush(&self, report: &mut TickReport) {
        for map in self.live.storage_maps().snapshot().iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| map.save())) {
                Ok(Ok(())) => report.flushed += 1,
                Ok(Err(e)) => {
                    report.flush_failures += 1;
                    tracing::error!("Flushing map {:?} failed: {}", map.name(), e);
                }
                Err(payload) => {
                    report.flush_failures += 1;
                    tracing::error!(
                        "Flushing map {:?} panicked: {}",
                        map.name(),
                        panic_message(&*payload)
                    );
                }
            }
        }
    }
}

/// Dedicated thread running [`BackgroundTasks::run_tick`] every interval
///
/// The wait between ticks is a channel receive with a timeout, so `stop`
/// wakes the thread right away instead of after up to one interval. A tick
/// already under way is finished first.
pub struct BackgroundScheduler {
    stopped: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    stop_tx: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub(crate) fn start(tasks: Arc<BackgroundTasks>, interval: Duration) -> Result<Self> {
        let stopped = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = {
            let stopped = Arc::clone(&stopped);
            let ticks = Arc::clone(&ticks);

            thread::Builder::new()
                .name("aostore-background".to_string())
                .spawn(move || loop {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if stopped.load(Ordering::Acquire) {
                        break;
                    }

                    // Phases contain per-map panics; anything else ends only
                    // this tick.
                    let tick = panic::catch_unwind(AssertUnwindSafe(|| tasks.run_tick()));
                    if let Err(payload) = tick {
                        tracing::error!("Background tick panicked: {}", panic_message(&*payload));
                    }
                    ticks.fetch_add(1, Ordering::Release);
                })?
        };

        Ok(Self {
            stopped,
            ticks,
            stop_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.stop_tx.try_send(());

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("Background thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Ticks completed by the background thread so far
    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
