use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// We define various kinds of latches, which are all a primitive signaling
/// mechanism. A latch starts as false. Eventually someone calls `set()` and
/// it becomes true. You can test if it has been set by calling `is_set()`.
pub trait Latch {
    /// Set the latch, signalling others.
    fn set(&self);
    /// Test if the latch is set.
    fn is_set(&self) -> bool;
}

/// Spin latches are the simplest, most efficient kind, but they do not support
/// a `wait()` operation. They just have a boolean flag that becomes true when
/// `set()` is called.
#[derive(Debug, Default)]
pub struct SpinLatch {
    b: AtomicBool,
}

impl SpinLatch {
    #[inline]
    pub fn new() -> SpinLatch {
        SpinLatch {
            b: AtomicBool::new(false),
        }
    }
}

impl Latch for SpinLatch {
    #[inline]
    fn set(&self) {
        self.b.store(true, Ordering::SeqCst);
    }

    #[inline]
    fn is_set(&self) -> bool {
        self.b.load(Ordering::SeqCst)
    }
}

/// A Latch starts as false and eventually becomes true. You can block until
/// it becomes true.
#[derive(Debug, Default)]
pub struct LockLatch {
    m: Mutex<bool>,
    v: Condvar,
}

impl LockLatch {
    #[inline]
    pub fn new() -> LockLatch {
        LockLatch {
            m: Mutex::new(false),
            v: Condvar::new(),
        }
    }

    /// Block until latch is set.
    pub fn wait(&self) {
        let mut guard = self.m.lock().unwrap();
        while !*guard {
            guard = self.v.wait(guard).unwrap();
        }
    }

    /// Block until latch is set or `timeout` elapsed. Returns true if the latch has been set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.m.lock().unwrap();

        while !*guard {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            guard = self.v.wait_timeout(guard, deadline - now).unwrap().0;
        }

        true
    }
}

impl Latch for LockLatch {
    #[inline]
    fn set(&self) {
        let mut guard = self.m.lock().unwrap();
        *guard = true;
        self.v.notify_all();
    }

    #[inline]
    fn is_set(&self) -> bool {
        *self.m.lock().unwrap()
    }
}

/// Counting latches track a counter. Unlike other latches, calling `set()` does not necessarily
/// make the latch be considered set; instead, it just decrements the counter. The latch is only
/// set once the counter reaches zero, after which it stays set.
#[derive(Debug)]
pub struct CountLatch {
    counter: AtomicUsize,
}

impl Default for CountLatch {
    fn default() -> Self {
        CountLatch::new()
    }
}

impl CountLatch {
    #[inline]
    pub fn new() -> CountLatch {
        CountLatch::with_count(1)
    }

    #[inline]
    pub fn with_count(count: usize) -> CountLatch {
        CountLatch {
            counter: AtomicUsize::new(count),
        }
    }

    #[inline]
    pub fn increment(&self) {
        debug_assert!(!self.is_set());
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Increments the counter unless the latch is already set. Returns false if it was.
    pub fn try_increment(&self) -> bool {
        let mut current = self.counter.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return false;
            }

            match self.counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(v) => current = v,
            }
        }
    }

    /// Decrements the counter. Returns true for the one call that brings it down to zero.
    #[inline]
    pub fn decrement(&self) -> bool {
        self.counter.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

impl Latch for CountLatch {
    #[inline]
    fn is_set(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == 0
    }

    #[inline]
    fn set(&self) {
        self.decrement();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn count_latch() {
        let latch = CountLatch::with_count(2);
        assert!(!latch.decrement());
        assert!(!latch.is_set());
        assert!(latch.decrement());
        assert!(latch.is_set());
        assert!(!latch.try_increment());
    }

    #[test]
    fn lock_latch_timeout() {
        let latch = Arc::new(LockLatch::new());
        assert!(!latch.wait_timeout(Duration::from_millis(5)));

        let l2 = latch.clone();
        let t = thread::spawn(move || l2.set());
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        t.join().unwrap();
    }
}
