extern crate crayon_soundloader;

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crayon_soundloader::errors::*;
use crayon_soundloader::file::{FileCache, FileCacheHandle, FileReader, FileSystem, IoPriority, Memory};
use crayon_soundloader::sched::latch::{Latch, LockLatch};
use crayon_soundloader::sched::{Future, Promise, SchedulerSystem};

use common::{init, wait};

/// Serves 256 bytes counting up from zero. Reads block until `gate` is set.
struct Gated {
    gate: Arc<LockLatch>,
    drops: Arc<AtomicUsize>,
}

struct GatedReader {
    gate: Arc<LockLatch>,
    drops: Arc<AtomicUsize>,
}

impl FileSystem for Gated {
    fn open(&self, _: &Path) -> Result<Box<dyn FileReader>> {
        Ok(Box::new(GatedReader {
            gate: self.gate.clone(),
            drops: self.drops.clone(),
        }))
    }

    fn exists(&self, _: &Path) -> bool {
        true
    }
}

impl FileReader for GatedReader {
    fn size(&self) -> Result<u64> {
        Ok(256)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8], _: IoPriority) -> Result<usize> {
        self.gate.wait();

        let mut len = 0;
        for (i, v) in buf.iter_mut().enumerate() {
            let pos = offset as usize + i;
            if pos >= 256 {
                break;
            }

            *v = pos as u8;
            len += 1;
        }

        Ok(len)
    }
}

impl Drop for GatedReader {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn open(cache: &Arc<FileCache>, path: &str) -> Future<Result<Arc<FileCacheHandle>>> {
    let mut promise = Promise::new();
    let future = promise.get_future();
    cache.create_file_cache_handle(path, move |v| promise.emplace_value(v));
    future
}

fn read(handle: &Arc<FileCacheHandle>, offset: u64, bytes: usize) -> Future<Result<Vec<u8>>> {
    let mut promise = Promise::new();
    let future = promise.get_future();
    handle.read_data(offset, bytes, IoPriority::Normal, move |v| {
        promise.emplace_value(v)
    });
    future
}

fn unwrap_handle(v: &Result<Arc<FileCacheHandle>>) -> Arc<FileCacheHandle> {
    match *v {
        Ok(ref handle) => handle.clone(),
        Err(ref err) => panic!("{}", err),
    }
}

#[test]
fn open_errors() {
    init();

    let sys = SchedulerSystem::new(2, None, None).unwrap();
    let fs = Arc::new(Memory::new());
    fs.insert("empty.bnk", Vec::new());
    let cache = FileCache::new(fs, sys.shared());

    let missing = open(&cache, "missing.bnk");
    match wait(&missing) {
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::FileNotFound(path)) => assert_eq!(path, Path::new("missing.bnk")),
            other => panic!("unexpected {:?}", other),
        },
        Ok(_) => panic!("opened a missing file"),
    }

    let empty = open(&cache, "empty.bnk");
    match wait(&empty) {
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::EmptyFile(_)) => {}
            other => panic!("unexpected {:?}", other),
        },
        Ok(_) => panic!("opened an empty file"),
    }

    cache.term();
    sys.terminate();
}

#[test]
fn reads() {
    init();

    let sys = SchedulerSystem::new(4, None, None).unwrap();
    let fs = Arc::new(Memory::new());
    fs.insert("a.wem", (0..200u8).collect());
    let cache = FileCache::new(fs, sys.shared());

    let handle = unwrap_handle(wait(&open(&cache, "a.wem")));
    assert_eq!(handle.size(), 200);
    assert_eq!(handle.path(), Path::new("a.wem"));

    let futures: Vec<_> = (0..10u64).map(|i| read(&handle, i * 20, 20)).collect();
    for (i, v) in futures.iter().enumerate() {
        let bytes = wait(v).as_ref().unwrap();
        let start = i as u8 * 20;
        assert_eq!(*bytes, (start..start + 20).collect::<Vec<_>>());
    }

    // Reads past the end are truncated.
    let tail = read(&handle, 190, 64);
    assert_eq!(wait(&tail).as_ref().unwrap().len(), 10);

    handle.close_and_delete();
    cache.term();
    sys.terminate();
}

#[test]
fn close_waits_for_reads() {
    init();

    let sys = SchedulerSystem::new(4, None, None).unwrap();
    let gate = Arc::new(LockLatch::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let fs = Arc::new(Gated {
        gate: gate.clone(),
        drops: drops.clone(),
    });

    let cache = FileCache::new(fs, sys.shared());
    let handle = unwrap_handle(wait(&open(&cache, "gated.wem")));

    let futures: Vec<_> = (0..3u64).map(|i| read(&handle, i * 64, 64)).collect();
    assert_eq!(handle.in_flight(), 3);

    handle.clone().close_and_delete();
    thread::sleep(Duration::from_millis(20));
    assert!(handle.is_open());
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    gate.set();
    for (i, v) in futures.iter().enumerate() {
        let bytes = wait(v).as_ref().unwrap();
        assert_eq!(bytes[0], i as u8 * 64);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.is_open() && Instant::now() < deadline {
        thread::yield_now();
    }

    assert!(!handle.is_open());
    assert_eq!(handle.in_flight(), 0);

    let late = read(&handle, 0, 4);
    match wait(&late) {
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::FileNotOpened(_)) => {}
            other => panic!("unexpected {:?}", other),
        },
        Ok(_) => panic!("read a closed file"),
    }

    drop(handle);
    cache.term();
    sys.terminate();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn close_from_read_headless() {
    init();

    let sys = SchedulerSystem::headless();
    let fs = Arc::new(Memory::new());
    fs.insert("a.bnk", vec![7; 32]);
    let cache = FileCache::new(fs, sys.shared());

    let handle = unwrap_handle(wait(&open(&cache, "a.bnk")));
    let h2 = handle.clone();
    let mut promise = Promise::new();
    let future = promise.get_future();

    handle.read_all(move |v| {
        h2.close_and_delete();
        promise.emplace_value(v.map(|v| v.len()).unwrap_or(0));
    });

    assert_eq!(*future.get(), 32);
    assert!(!handle.is_open());
    cache.term();
}
