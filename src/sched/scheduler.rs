use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

use super::latch::{CountLatch, Latch, LockLatch};
use super::unwind::{self, AbortIfPanic};
use super::PanicHandler;
use crate::errors::*;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    terminator: CountLatch,
    watcher: Watcher,
    threads: Vec<ThreadInfo>,
    injector: Injector<Job>,
    panic_handler: Option<Box<PanicHandler>>,
}

struct ThreadInfo {
    stealer: Stealer<Job>,
    primed: LockLatch,
    terminated: LockLatch,
}

impl Scheduler {
    pub fn new(
        num: u32,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
    ) -> Result<Arc<Self>> {
        let workers: Vec<_> = (0..num).map(|_| Worker::new_fifo()).collect();
        let threads = workers
            .iter()
            .map(|w| ThreadInfo {
                stealer: w.stealer(),
                primed: LockLatch::new(),
                terminated: LockLatch::new(),
            })
            .collect();

        let scheduler = Arc::new(Scheduler {
            terminator: CountLatch::new(),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
            threads,
            injector: Injector::new(),
            panic_handler,
        });

        for (index, worker) in workers.into_iter().enumerate() {
            let sc = scheduler.clone();
            let mut b = thread::Builder::new().name(format!("sched-worker-{}", index));

            if let Some(stack_size) = stack_size {
                b = b.stack_size(stack_size);
            }

            b.spawn(move || Scheduler::main_loop(sc, index, worker))?;
        }

        for v in &scheduler.threads {
            v.primed.wait();
        }

        Ok(scheduler)
    }

    /// Push a job into the "external jobs" queue; it will be taken by whatever
    /// worker has nothing to do.
    pub fn inject(&self, job: Job) {
        self.injector.push(job);
        self.watcher.notify_one();
    }

    /// Runs `job` with panics routed to the panic handler, then releases the count it held on the
    /// terminator.
    pub fn execute(&self, job: Job) {
        if let Err(err) = unwind::halt_unwinding(job) {
            self.handle_panic(err);
        }

        self.terminator.set();
    }

    pub fn handle_panic(&self, err: Box<dyn ::std::any::Any + Send>) {
        match self.panic_handler {
            Some(ref handler) => {
                // If the customizable panic handler itself panics, then we abort.
                let abort_guard = AbortIfPanic;
                handler(err);
                mem::forget(abort_guard);
            }
            None => {
                error!("Job panicked: {}.", unwind::describe(err.as_ref()));
            }
        }
    }

    /// Reserves a count on the terminator for a job about to be injected. Fails once the
    /// scheduler terminated.
    #[inline]
    pub fn terminate_inc(&self) -> bool {
        self.terminator.try_increment()
    }

    #[inline]
    pub fn terminate_dec(&self) {
        self.terminator.set();
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_set()
    }

    /// Blocks current thread until all the workers finished their jobs gracefully.
    pub fn wait_until_terminated(&self) {
        let check = || self.threads.iter().any(|v| !v.terminated.is_set());

        while check() {
            self.watcher.notify_all();
            thread::yield_now();
        }
    }

    /// Blocks current thread until `latch` is set. Worker threads of this scheduler keep busy by
    /// popping and stealing jobs in the meantime.
    pub fn wait_until(self: &Arc<Self>, latch: &LockLatch) {
        match WorkerThread::current() {
            Some(ref worker) if Arc::ptr_eq(&worker.scheduler, self) => worker.wait_until(latch),
            _ => latch.wait(),
        }
    }

    fn main_loop(scheduler: Arc<Scheduler>, index: usize, worker: Worker<Job>) {
        let worker_thread = Rc::new(WorkerThread {
            scheduler,
            index,
            worker,
        });

        WorkerThread::set_current(worker_thread.clone());
        worker_thread.scheduler.threads[index].primed.set();

        worker_thread.wait_until(&worker_thread.scheduler.terminator);

        worker_thread.scheduler.threads[index].terminated.set();
        WorkerThread::clear_current();
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let duration = Duration::from_millis(ms);
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, duration);
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}

struct WorkerThread {
    scheduler: Arc<Scheduler>,
    index: usize,
    worker: Worker<Job>,
}

thread_local! {
    static WORKER_THREAD_STATE: RefCell<Option<Rc<WorkerThread>>> = RefCell::new(None);
}

impl WorkerThread {
    fn current() -> Option<Rc<WorkerThread>> {
        WORKER_THREAD_STATE.with(|t| t.borrow().clone())
    }

    fn set_current(thread: Rc<WorkerThread>) {
        WORKER_THREAD_STATE.with(|t| {
            let mut t = t.borrow_mut();
            assert!(t.is_none());
            *t = Some(thread);
        });
    }

    fn clear_current() {
        WORKER_THREAD_STATE.with(|t| t.borrow_mut().take());
    }

    fn wait_until<L: Latch>(&self, latch: &L) {
        let mut ms = 1;

        while !latch.is_set() {
            if let Some(job) = self.find_work() {
                self.scheduler.execute(job);
                self.scheduler.watcher.notify_all();
                ms = 1;
            } else {
                self.scheduler.watcher.wait_timeout(ms);
                ms = (ms * 2).min(48);
            }
        }
    }

    fn find_work(&self) -> Option<Job> {
        self.worker.pop().or_else(|| loop {
            let steal = self
                .scheduler
                .injector
                .steal_batch_and_pop(&self.worker)
                .or_else(|| self.steal());

            match steal {
                Steal::Success(job) => return Some(job),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        })
    }

    fn steal(&self) -> Steal<Job> {
        self.scheduler
            .threads
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.index)
            .map(|(_, v)| v.stealer.steal())
            .collect()
    }
}
