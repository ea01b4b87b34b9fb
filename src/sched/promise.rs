//! One-shot result channel with continuation chaining.
//!
//! A `Promise` sets the result exactly once. The matching `Future` either blocks for it or chains
//! a continuation that runs exactly once, on whichever thread completes the pair (or immediately,
//! if the result is already there).

use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use super::latch::{CountLatch, Latch, LockLatch, SpinLatch};

type Continuation = Box<dyn FnOnce() + Send + 'static>;

struct Shared<T> {
    value: OnceLock<T>,
    complete: SpinLatch,
    continuation: Mutex<Option<Continuation>>,
    // Created lazily, only if somebody actually blocks.
    waiter: Mutex<Option<Arc<LockLatch>>>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn new() -> Self {
        Shared {
            value: OnceLock::new(),
            complete: SpinLatch::new(),
            continuation: Mutex::new(None),
            waiter: Mutex::new(None),
        }
    }

    fn emplace(&self, value: T) -> bool {
        if self.value.set(value).is_err() {
            return false;
        }

        self.complete.set();

        let continuation = self.continuation.lock().unwrap().take();
        if let Some(func) = continuation {
            func();
        }

        if let Some(waiter) = self.waiter.lock().unwrap().take() {
            waiter.set();
        }

        true
    }

    fn on_complete(&self, func: Continuation) {
        {
            let mut continuation = self.continuation.lock().unwrap();
            if !self.complete.is_set() {
                if continuation.is_some() {
                    programming_error!("Future already has a continuation.");
                }

                *continuation = Some(func);
                return;
            }
        }

        func();
    }

    fn wait_for(&self, timeout: Option<Duration>) -> bool {
        if self.complete.is_set() {
            return true;
        }

        let latch = {
            let mut waiter = self.waiter.lock().unwrap();
            if self.complete.is_set() {
                return true;
            }

            waiter
                .get_or_insert_with(|| Arc::new(LockLatch::new()))
                .clone()
        };

        match timeout {
            Some(timeout) => latch.wait_timeout(timeout),
            None => {
                latch.wait();
                true
            }
        }
    }
}

/// The producing side of a one-shot result.
pub struct Promise<T: Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
    retrieved: bool,
}

impl<T: Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T: Send + Sync + 'static> Promise<T> {
    pub fn new() -> Self {
        Promise {
            shared: Arc::new(Shared::new()),
            retrieved: false,
        }
    }

    /// Creates a promise that is already fulfilled with `value`, and returns its future.
    pub fn fulfilled(value: T) -> Future<T> {
        let mut promise = Promise::new();
        promise.emplace_value(value);
        promise.get_future()
    }

    /// Retrieves the future of this promise. A promise hands out exactly one future.
    pub fn get_future(&mut self) -> Future<T> {
        if self.retrieved {
            programming_error!("The future of a promise has already been retrieved.");
        }

        self.retrieved = true;
        Future {
            shared: self.shared.clone(),
        }
    }

    /// Sets the result and runs the attached continuation, if any, on the calling thread.
    pub fn emplace_value(&self, value: T) {
        if !self.shared.emplace(value) {
            programming_error!("Promise fulfilled twice.");
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.shared.complete.is_set()
    }
}

impl<T: Send + Sync + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.is_complete() && !thread::panicking() {
            programming_error!("Promise dropped without a value.");
        }
    }
}

/// The consuming side of a one-shot result.
pub struct Future<T: Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> Future<T> {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.shared.complete.is_set()
    }

    /// Blocks until the result is available and returns it. Repeated calls return the same value.
    pub fn get(&self) -> &T {
        self.shared.wait_for(None);
        match self.shared.value.get() {
            Some(v) => v,
            None => unreachable!(),
        }
    }

    /// Blocks at most `timeout`. Returns true if the result is available.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.shared.wait_for(Some(timeout))
    }

    /// Consumes this future and invokes `func` with a ready future over the same result once it
    /// is available. Returns a future of whatever `func` returns.
    pub fn then<F, R>(self, func: F) -> Future<R>
    where
        F: FnOnce(Future<T>) -> R + Send + 'static,
        R: Send + Sync + 'static,
    {
        let mut promise = Promise::new();
        let future = promise.get_future();

        let shared = self.shared.clone();
        self.shared.on_complete(Box::new(move || {
            let value = func(Future { shared });
            promise.emplace_value(value);
        }));

        future
    }

    /// Like `then`, but hands the continuation a reference to the result.
    pub fn next<F, R>(self, func: F) -> Future<R>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Send + Sync + 'static,
    {
        self.then(move |v| func(v.get()))
    }

    /// Runs `func` once the result is available, discarding its return value.
    pub fn on_ready<F>(self, func: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let shared = self.shared.clone();
        self.shared.on_complete(Box::new(move || {
            if let Some(v) = shared.value.get() {
                func(v);
            }
        }));
    }
}

/// Returns a future that completes once every future in `futures` completed.
pub fn join_all<T: Send + Sync + 'static>(futures: Vec<Future<T>>) -> Future<()> {
    if futures.is_empty() {
        return Promise::fulfilled(());
    }

    let mut promise = Promise::new();
    let future = promise.get_future();
    let promise = Arc::new(promise);
    let remains = Arc::new(CountLatch::with_count(futures.len()));

    for v in futures {
        let (promise, remains) = (promise.clone(), remains.clone());
        v.on_ready(move |_| {
            if remains.decrement() {
                promise.emplace_value(());
            }
        });
    }

    future
}

/// Gathers the values of `futures` in their original order once all of them are ready.
pub fn collect_all<T: Clone + Send + Sync + 'static>(futures: Vec<Future<T>>) -> Future<Vec<T>> {
    if futures.is_empty() {
        return Promise::fulfilled(Vec::new());
    }

    let mut promise = Promise::new();
    let future = promise.get_future();
    let promise = Arc::new(promise);
    let remains = Arc::new(CountLatch::with_count(futures.len()));
    let slots = Arc::new(Mutex::new(vec![None; futures.len()]));

    for (i, v) in futures.into_iter().enumerate() {
        let (promise, remains, slots) = (promise.clone(), remains.clone(), slots.clone());
        v.on_ready(move |value| {
            slots.lock().unwrap()[i] = Some(value.clone());

            if remains.decrement() {
                let values = slots.lock().unwrap().iter_mut().filter_map(|v| v.take()).collect();
                promise.emplace_value(values);
            }
        });
    }

    future
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn then_after_completion() {
        let mut promise = Promise::new();
        let future = promise.get_future();
        promise.emplace_value(2);

        let next = future.next(|v| v * 3);
        assert!(next.is_ready());
        assert_eq!(*next.get(), 6);
        assert_eq!(*next.get(), 6);
    }

    #[test]
    fn then_before_completion() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut promise = Promise::new();

        let h2 = hits.clone();
        let next = promise.get_future().then(move |v| {
            h2.fetch_add(1, Ordering::SeqCst);
            format!("{}", v.get())
        });

        assert!(!next.is_ready());
        promise.emplace_value(7);
        assert_eq!(next.get(), "7");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_for_timeout() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future();
        assert!(!future.wait_for(Duration::from_millis(1)));
        promise.emplace_value(1);
        assert!(future.wait_for(Duration::from_millis(1)));
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn emplace_twice() {
        let promise = Promise::new();
        promise.emplace_value(1);
        promise.emplace_value(2);
    }

    #[test]
    fn join() {
        let mut promises: Vec<Promise<u32>> = (0..3).map(|_| Promise::new()).collect();
        let futures = promises.iter_mut().map(|v| v.get_future()).collect();
        let all = join_all(futures);

        for (i, v) in promises.iter().enumerate() {
            assert!(!all.is_ready());
            v.emplace_value(i as u32);
        }

        assert!(all.is_ready());
        assert!(join_all::<u32>(Vec::new()).is_ready());
    }

    #[test]
    fn collect() {
        let mut promises: Vec<Promise<u32>> = (0..3).map(|_| Promise::new()).collect();
        let futures = promises.iter_mut().map(|v| v.get_future()).collect();
        let all = collect_all(futures);

        promises[2].emplace_value(7);
        promises[0].emplace_value(3);
        assert!(!all.is_ready());
        promises[1].emplace_value(5);

        assert_eq!(*all.get(), vec![3, 5, 7]);
        assert!(collect_all::<u32>(Vec::new()).get().is_empty());
    }
}
