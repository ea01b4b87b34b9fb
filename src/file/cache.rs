//! Asynchronous open/read/close over a `FileSystem`.
//!
//! Opens are serialized on one queue, deletions of handles on another. Reads are independent jobs
//! of the scheduler. There are no retries at this layer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::vfs::{FileReader, FileSystem, IoPriority};
use crate::errors::*;
use crate::sched::{ExecutionQueue, SchedulerShared};

pub struct FileCache {
    fs: Arc<dyn FileSystem>,
    open_queue: ExecutionQueue,
    delete_queue: ExecutionQueue,
    scheduler: Arc<SchedulerShared>,
}

impl FileCache {
    pub fn new(fs: Arc<dyn FileSystem>, scheduler: Arc<SchedulerShared>) -> Arc<Self> {
        Arc::new(FileCache {
            fs,
            open_queue: ExecutionQueue::new("FileCache::open", scheduler.clone()),
            delete_queue: ExecutionQueue::new("FileCache::delete", scheduler.clone()),
            scheduler,
        })
    }

    #[inline]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Opens the file at `path`, then queries its size. An empty file counts as a failure.
    pub fn create_file_cache_handle<T, F>(self: &Arc<Self>, path: T, on_done: F)
    where
        T: Into<PathBuf>,
        F: FnOnce(Result<Arc<FileCacheHandle>>) + Send + 'static,
    {
        let path = path.into();
        let cache = self.clone();

        self.open_queue.async_(move || match cache.fs.open(&path) {
            Ok(reader) => {
                let c2 = cache.clone();
                cache.open_queue.async_(move || {
                    let result = FileCacheHandle::new(c2, path, reader);
                    on_done(result);
                });
            }
            Err(err) => {
                warn!("Failed to open {:?}: {}.", path, err);
                on_done(Err(err));
            }
        });
    }

    /// Drains both queues.
    pub fn term(&self) {
        self.open_queue.close();
        self.delete_queue.close();
    }
}

pub struct FileCacheHandle {
    cache: Arc<FileCache>,
    path: PathBuf,
    size: u64,
    reader: Mutex<Option<Arc<dyn FileReader>>>,
    in_flight: AtomicUsize,
}

impl FileCacheHandle {
    fn new(
        cache: Arc<FileCache>,
        path: PathBuf,
        reader: Box<dyn FileReader>,
    ) -> Result<Arc<Self>> {
        let size = reader.size()?;
        if size == 0 {
            return Err(Error::EmptyFile(path).into());
        }

        Ok(Arc::new(FileCacheHandle {
            cache,
            path,
            size,
            reader: Mutex::new(Some(Arc::from(reader))),
            in_flight: AtomicUsize::new(0),
        }))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.reader.lock().unwrap().is_some()
    }

    /// Number of reads issued that are still using the reader.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Reads `bytes` bytes at `offset` asynchronously. Fails right away if the handle has been
    /// closed.
    pub fn read_data<F>(self: &Arc<Self>, offset: u64, bytes: usize, priority: IoPriority, on_done: F)
    where
        F: FnOnce(Result<Vec<u8>>) + Send + 'static,
    {
        if !self.is_open() {
            on_done(Err(Error::FileNotOpened(self.path.clone()).into()));
            return;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let handle = self.clone();
        self.cache.scheduler.spawn(move || {
            let result = handle.read(offset, bytes, priority);
            handle.in_flight.fetch_sub(1, Ordering::SeqCst);
            on_done(result);
        });
    }

    /// Reads the whole file.
    pub fn read_all<F>(self: &Arc<Self>, on_done: F)
    where
        F: FnOnce(Result<Vec<u8>>) + Send + 'static,
    {
        self.read_data(0, self.size as usize, IoPriority::Normal, on_done);
    }

    /// Releases the reader once every read in flight reported back.
    pub fn close_and_delete(self: Arc<Self>) {
        let cache = self.cache.clone();
        cache.delete_queue.async_always(move || self.try_delete());
    }

    fn try_delete(self: Arc<Self>) {
        if self.in_flight() > 0 {
            thread::yield_now();
            let cache = self.cache.clone();
            cache.delete_queue.async_always(move || self.try_delete());
            return;
        }

        if self.reader.lock().unwrap().take().is_some() {
            trace!("Released file handle {:?}.", self.path);
        }
    }

    fn read(&self, offset: u64, bytes: usize, priority: IoPriority) -> Result<Vec<u8>> {
        let reader = match *self.reader.lock().unwrap() {
            Some(ref v) => v.clone(),
            None => return Err(Error::FileNotOpened(self.path.clone()).into()),
        };

        let mut buf = vec![0; bytes];
        let len = reader.read_at(offset, &mut buf, priority)?;
        buf.truncate(len);

        trace!(
            "Read {} bytes of {:?} at {} with {:?} priority.",
            len,
            self.path,
            offset,
            priority
        );

        Ok(buf)
    }
}
