//! Merge worker pool
//!
//! Fixed set of worker threads fed from one crossbeam channel. A pool is
//! owned by one engine unless it is passed to several engines explicitly
//! with [`crate::Engine::open_with_pool`].

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::buffer::MergeStats;
use crate::error::{AoError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct MergePool {
    sender: Sender<Job>,
    workers: usize,
}

impl MergePool {
    /// Start a pool with `workers` threads (0 = available parallelism).
    ///
    /// Workers exit once the pool is dropped and the queue has drained.
    pub fn new(workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            workers
        };

        let (sender, receiver) = channel::unbounded::<Job>();
        for i in 0..workers {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("aostore-merge-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
        }

        tracing::debug!("Merge pool started with {} workers", workers);
        Ok(Self { sender, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue one merge unit.
    ///
    /// A panic inside `task` is caught on the worker and reported through
    /// the handle as [`AoError::MergePanicked`]; the worker keeps running.
    pub fn submit<F>(&self, task: F) -> Result<MergeHandle>
    where
        F: FnOnce() -> Result<MergeStats> + Send + 'static,
    {
        let (done_tx, done_rx) = channel::bounded(1);

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|payload| Err(AoError::MergePanicked(panic_message(&*payload))));
            let _ = done_tx.send(outcome);
        });

        self.sender.send(job).map_err(|_| AoError::PoolShutdown)?;
        Ok(MergeHandle { done: done_rx })
    }
}

/// Completion handle for one submitted merge unit
pub struct MergeHandle {
    done: Receiver<Result<MergeStats>>,
}

impl MergeHandle {
    /// Block until the unit finishes
    pub fn wait(self) -> Result<MergeStats> {
        self.done.recv().map_err(|_| AoError::PoolShutdown)?
    }
}

pub(super) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
