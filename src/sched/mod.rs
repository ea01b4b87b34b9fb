//! The worker pool and the asynchronous primitives built on top of it.
//!
//! `SchedulerSystem` owns a fixed set of worker threads fed by a shared injector queue.
//! `ExecutionQueue` serializes closures per owner on top of those workers, and
//! `Promise`/`Future` carry one-shot results between them.

pub mod latch;
pub mod promise;
pub mod queue;

mod scheduler;
mod unwind;

pub use self::promise::{collect_all, join_all, Future, Promise};
pub use self::queue::ExecutionQueue;

use std::sync::Arc;

use self::latch::{Latch, LockLatch};
use self::scheduler::Scheduler;
use crate::errors::*;

/// The type for a panic handling closure. Note that this same closure
/// may be invoked multiple times in parallel.
pub type PanicHandler = dyn Fn(Box<dyn ::std::any::Any + Send>) + Send + Sync;

pub struct SchedulerSystem {
    shared: Arc<SchedulerShared>,
}

impl SchedulerSystem {
    pub fn new(
        num: u32,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
    ) -> Result<Self> {
        let scheduler = Scheduler::new(num, stack_size, panic_handler)?;
        let shared = SchedulerShared {
            scheduler: Some(scheduler),
        };

        Ok(SchedulerSystem {
            shared: Arc::new(shared),
        })
    }

    /// Creates a scheduler without worker threads. Every spawned job runs inline on the thread
    /// that spawned it.
    pub fn headless() -> Self {
        SchedulerSystem {
            shared: Arc::new(SchedulerShared { scheduler: None }),
        }
    }

    #[inline]
    pub fn shared(&self) -> Arc<SchedulerShared> {
        self.shared.clone()
    }

    /// Signals that the thread-pool has been dropped. Blocks current thread until all the
    /// workers finished their jobs gracefully. Jobs spawned afterwards run inline.
    pub fn terminate(&self) {
        if let Some(ref scheduler) = self.shared.scheduler {
            if !scheduler.is_terminated() {
                scheduler.terminate_dec();
                scheduler.wait_until_terminated();
                info!("Scheduler terminated.");
            }
        }
    }
}

pub struct SchedulerShared {
    scheduler: Option<Arc<Scheduler>>,
}

impl SchedulerShared {
    /// Returns true if jobs are executed by worker threads.
    #[inline]
    pub fn is_threaded(&self) -> bool {
        self.scheduler
            .as_ref()
            .map(|v| !v.is_terminated())
            .unwrap_or(false)
    }

    /// Spawn an asynchronous job. Falls back to running `func` on the calling thread when the
    /// scheduler is headless or has been terminated, so work is never dropped.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(ref scheduler) = self.scheduler {
            // Ensure that scheduler cannot terminate until this job has executed. The count is
            // released in `Scheduler::execute`.
            if scheduler.terminate_inc() {
                scheduler.inject(Box::new(func));
                return;
            }
        }

        if let Err(err) = unwind::halt_unwinding(func) {
            error!("Job panicked: {}.", unwind::describe(err.as_ref()));
        }
    }

    /// Blocks current thread until `latch` is set. If called from a worker thread, keeps it busy
    /// with other jobs in the meantime.
    pub fn wait_until(&self, latch: &LockLatch) {
        match self.scheduler {
            Some(ref scheduler) if !latch.is_set() => scheduler.wait_until(latch),
            _ => latch.wait(),
        }
    }
}
