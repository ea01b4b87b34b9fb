//! A strictly ordered, single-worker task runner.
//!
//! Producers never block: `async_` pushes the closure and starts a drain job on the scheduler
//! only if nobody is draining yet. At most one closure of a queue runs at any time, and closures
//! run in submission order.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_deque::{Injector, Steal};

use super::latch::{Latch, LockLatch};
use super::unwind;
use super::SchedulerShared;

type Op = Box<dyn FnOnce() + Send + 'static>;

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;
const ADD_OP: u8 = 2;
const CLOSING: u8 = 3;
const CLOSED: u8 = 4;

fn state_name(v: u8) -> &'static str {
    match v {
        STOPPED => "Stopped",
        RUNNING => "Running",
        ADD_OP => "AddOp",
        CLOSING => "Closing",
        _ => "Closed",
    }
}

thread_local! {
    static RUNNING_QUEUES: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

static QUEUE_IDS: AtomicUsize = AtomicUsize::new(1);

struct QueueInner {
    id: usize,
    name: String,
    state: AtomicU8,
    ops: Injector<Op>,
    closed: LockLatch,
    // Serializes the submitters that drain a closed queue themselves.
    late_drain: Mutex<()>,
    scheduler: Arc<SchedulerShared>,
}

pub struct ExecutionQueue {
    inner: Arc<QueueInner>,
    detached: bool,
}

impl ExecutionQueue {
    pub fn new<T: Into<String>>(name: T, scheduler: Arc<SchedulerShared>) -> Self {
        let inner = QueueInner {
            id: QUEUE_IDS.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            state: AtomicU8::new(STOPPED),
            ops: Injector::new(),
            closed: LockLatch::new(),
            late_drain: Mutex::new(()),
            scheduler,
        };

        ExecutionQueue {
            inner: Arc::new(inner),
            detached: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueues `func`. Submitting to a closed queue is a programming error; the closure still
    /// runs synchronously so that no work is lost.
    pub fn async_<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.state.load(Ordering::SeqCst) == CLOSED {
            programming_error!("Submitted an operation to closed queue {}.", self.inner.name);
            if let Err(err) = unwind::halt_unwinding(func) {
                error!("Operation panicked: {}.", unwind::describe(err.as_ref()));
            }
            return;
        }

        self.inner.ops.push(Box::new(func));
        QueueInner::start_worker_if_needed(&self.inner);
    }

    /// Enqueues `func` and guarantees it is executed by a job of the scheduler, never inline by
    /// the caller, even if the queue is being torn down.
    pub fn async_always<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.inner.state.load(Ordering::SeqCst) {
            CLOSING | CLOSED => self.inner.scheduler.spawn(func),
            _ => self.async_(func),
        }
    }

    /// Enqueues `func` and blocks until it has been executed. Runs `func` inline if the caller is
    /// this queue's own worker.
    pub fn async_wait<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_running_in_this_thread() {
            func();
            return;
        }

        let latch = Arc::new(LockLatch::new());
        let l2 = latch.clone();
        self.async_(move || {
            func();
            l2.set();
        });

        self.inner.scheduler.wait_until(&latch);
    }

    /// Drains every queued operation, then terminates the queue. Blocks until the queue is
    /// closed, unless called from inside one of its own operations.
    pub fn close(&self) {
        if self.begin_close() && !self.is_running_in_this_thread() {
            self.inner.scheduler.wait_until(&self.inner.closed);
        }
    }

    /// Closes the queue without blocking. Storage is released once the worker observes the
    /// closed state.
    pub fn close_and_delete(mut self) {
        self.begin_close();
        self.detached = true;
    }

    #[inline]
    pub fn is_being_closed(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == CLOSING
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == CLOSED
    }

    /// Returns true if the calling thread is executing one of this queue's operations.
    pub fn is_running_in_this_thread(&self) -> bool {
        let id = self.inner.id;
        RUNNING_QUEUES.with(|v| v.borrow().contains(&id))
    }

    // Returns true if the caller has to wait for a worker to finish the drain.
    fn begin_close(&self) -> bool {
        let inner = &self.inner;
        loop {
            let current = inner.state.load(Ordering::SeqCst);
            match current {
                STOPPED => {
                    if inner.transit(STOPPED, CLOSED) {
                        inner.drain_closed();
                        return false;
                    }
                }
                RUNNING | ADD_OP => {
                    if inner.transit(current, CLOSING) {
                        return true;
                    }
                }
                CLOSING => return true,
                _ => return false,
            }
        }
    }
}

impl Drop for ExecutionQueue {
    fn drop(&mut self) {
        if !self.detached {
            self.close();
        }
    }
}

impl QueueInner {
    #[inline]
    fn transit(&self, from: u8, to: u8) -> bool {
        let succeeded = self
            .state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if succeeded {
            trace!(
                "Queue {} transits from {} to {}.",
                self.name,
                state_name(from),
                state_name(to)
            );
        }

        succeeded
    }

    fn start_worker_if_needed(inner: &Arc<QueueInner>) {
        loop {
            match inner.state.load(Ordering::SeqCst) {
                RUNNING => {
                    if inner.transit(RUNNING, ADD_OP) {
                        return;
                    }
                }
                STOPPED => {
                    if inner.transit(STOPPED, RUNNING) {
                        let worker = inner.clone();
                        inner.scheduler.spawn(move || QueueInner::work(&worker));
                        return;
                    }
                }
                CLOSED => {
                    // Raced with the final transition of the worker.
                    inner.drain_closed();
                    return;
                }
                _ => return,
            }
        }
    }

    fn work(inner: &Arc<QueueInner>) {
        RUNNING_QUEUES.with(|v| v.borrow_mut().push(inner.id));

        loop {
            inner.transit(ADD_OP, RUNNING);
            inner.drain();

            if inner.transit(RUNNING, STOPPED) {
                break;
            }

            if inner.transit(CLOSING, CLOSED) {
                inner.drain_closed();
                break;
            }
        }

        RUNNING_QUEUES.with(|v| v.borrow_mut().pop());
    }

    fn drain(&self) {
        loop {
            match self.ops.steal() {
                Steal::Success(op) => {
                    if let Err(err) = unwind::halt_unwinding(op) {
                        error!(
                            "Operation of queue {} panicked: {}.",
                            self.name,
                            unwind::describe(err.as_ref())
                        );
                    }
                }
                Steal::Empty => return,
                Steal::Retry => {}
            }
        }
    }

    fn drain_closed(&self) {
        {
            let _guard = self.late_drain.lock().unwrap();
            RUNNING_QUEUES.with(|v| v.borrow_mut().push(self.id));
            self.drain();
            RUNNING_QUEUES.with(|v| v.borrow_mut().pop());
        }

        self.closed.set();
    }
}
