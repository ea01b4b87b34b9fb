extern crate crayon_soundloader;
extern crate rand;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crayon_soundloader::sched::latch::{Latch, LockLatch};
use crayon_soundloader::sched::{ExecutionQueue, SchedulerSystem};

#[test]
fn ordered() {
    let sys = SchedulerSystem::new(4, None, None).unwrap();
    let queue = ExecutionQueue::new("ordered", sys.shared());
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..1024 {
        let seen = seen.clone();
        queue.async_(move || seen.lock().unwrap().push(i));
    }

    queue.close();
    assert!(queue.is_closed());

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..1024).collect::<Vec<_>>());
    sys.terminate();
}

#[test]
fn exclusive() {
    let sys = SchedulerSystem::new(4, None, None).unwrap();
    let queue = Arc::new(ExecutionQueue::new("exclusive", sys.shared()));
    let running = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let (queue, running, overlaps) = (queue.clone(), running.clone(), overlaps.clone());
            thread::spawn(move || {
                for _ in 0..256 {
                    let (running, overlaps) = (running.clone(), overlaps.clone());
                    queue.async_(move || {
                        if running.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }

                        if rand::random::<u8>() % 16 == 0 {
                            thread::yield_now();
                        }

                        running.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for v in producers {
        v.join().unwrap();
    }

    queue.close();
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    sys.terminate();
}

#[test]
fn per_producer_order() {
    let sys = SchedulerSystem::new(3, None, None).unwrap();
    let queue = Arc::new(ExecutionQueue::new("producers", sys.shared()));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..3)
        .map(|p| {
            let (queue, seen) = (queue.clone(), seen.clone());
            thread::spawn(move || {
                for i in 0..200 {
                    let seen = seen.clone();
                    queue.async_(move || seen.lock().unwrap().push((p, i)));
                }
            })
        })
        .collect();

    for v in producers {
        v.join().unwrap();
    }

    queue.close();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 600);
    for p in 0..3 {
        let mine: Vec<_> = seen.iter().filter(|v| v.0 == p).map(|v| v.1).collect();
        assert_eq!(mine, (0..200).collect::<Vec<_>>());
    }

    sys.terminate();
}

#[test]
fn wait() {
    let sys = SchedulerSystem::new(2, None, None).unwrap();
    let queue = ExecutionQueue::new("wait", sys.shared());
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..16 {
        let hits = hits.clone();
        queue.async_(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    let h2 = hits.clone();
    queue.async_wait(move || {
        assert_eq!(h2.load(Ordering::SeqCst), 16);
    });

    queue.close();
    sys.terminate();
}

#[test]
fn nested_wait_runs_inline() {
    let sys = SchedulerSystem::new(2, None, None).unwrap();
    let queue = Arc::new(ExecutionQueue::new("nested", sys.shared()));
    let latch = Arc::new(LockLatch::new());

    let (q2, l2) = (queue.clone(), latch.clone());
    queue.async_(move || {
        assert!(q2.is_running_in_this_thread());
        q2.async_wait(|| {});
        l2.set();
    });

    latch.wait();
    assert!(!queue.is_running_in_this_thread());
    queue.close();
    sys.terminate();
}

#[test]
fn close_drains() {
    let sys = SchedulerSystem::new(2, None, None).unwrap();
    let queue = ExecutionQueue::new("drain", sys.shared());
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let hits = hits.clone();
        queue.async_(move || {
            thread::yield_now();
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    queue.close();
    assert_eq!(hits.load(Ordering::SeqCst), 100);
    assert!(queue.is_closed());
    assert!(!queue.is_being_closed());
    sys.terminate();
}

#[test]
fn async_always_after_close() {
    let sys = SchedulerSystem::new(1, None, None).unwrap();
    let queue = ExecutionQueue::new("always", sys.shared());
    queue.close();

    let latch = Arc::new(LockLatch::new());
    let l2 = latch.clone();
    queue.async_always(move || l2.set());

    sys.shared().wait_until(&latch);
    assert!(latch.is_set());
    sys.terminate();
}

#[test]
fn close_and_delete() {
    let sys = SchedulerSystem::new(2, None, None).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    {
        let queue = ExecutionQueue::new("detached", sys.shared());
        for _ in 0..32 {
            let hits = hits.clone();
            queue.async_(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.close_and_delete();
    }

    sys.terminate();
    assert_eq!(hits.load(Ordering::SeqCst), 32);
}

#[test]
fn headless_trampoline() {
    let sys = SchedulerSystem::headless();
    let queue = Arc::new(ExecutionQueue::new("headless", sys.shared()));
    let seen = Arc::new(Mutex::new(Vec::new()));

    // Operations submitted from inside an operation run after it, not nested in it.
    let (q2, s2) = (queue.clone(), seen.clone());
    queue.async_(move || {
        let s3 = s2.clone();
        q2.async_(move || s3.lock().unwrap().push(2));
        s2.lock().unwrap().push(1);
    });

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    queue.close();
}
