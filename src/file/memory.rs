use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::cache::FileCache;
use super::state::{CloseCompletion, FileOps, LoadCompletion, OpenCompletion, UnloadCompletion};
use crate::engine::{EngineError, EngineResult, ShortId, SoundEngine};

/// How one kind of resource goes in and out of the sound engine.
pub trait EngineBinding: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;
    fn short_id(&self) -> ShortId;
    fn path(&self) -> &Path;

    fn is_streamed(&self) -> bool {
        false
    }

    fn load(&self, engine: &dyn SoundEngine, data: &[u8]) -> EngineResult;
    fn unload(&self, engine: &dyn SoundEngine) -> EngineResult;

    /// Returns true if a failed unload leaves the engine without the data, in which case the
    /// file is released along with it.
    fn unload_failure_closes_file(&self) -> bool {
        false
    }
}

/// File operations of resources that are read into memory entirely before being handed to the
/// engine.
pub struct MemoryFileOps<B: EngineBinding> {
    inner: Arc<MemoryFile<B>>,
}

struct MemoryFile<B> {
    binding: B,
    path: PathBuf,
    cache: Arc<FileCache>,
    engine: Arc<dyn SoundEngine>,
    data: Mutex<Option<Vec<u8>>>,
}

impl<B: EngineBinding> MemoryFileOps<B> {
    pub fn new(binding: B, root: &Path, cache: Arc<FileCache>, engine: Arc<dyn SoundEngine>) -> Self {
        let path = root.join(binding.path());
        MemoryFileOps {
            inner: Arc::new(MemoryFile {
                binding,
                path,
                cache,
                engine,
                data: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn binding(&self) -> &B {
        &self.inner.binding
    }

    #[inline]
    pub fn is_in_memory(&self) -> bool {
        self.inner.data.lock().unwrap().is_some()
    }
}

impl<B: EngineBinding> FileOps for MemoryFileOps<B> {
    fn type_name(&self) -> &'static str {
        self.inner.binding.type_name()
    }

    fn short_id(&self) -> ShortId {
        self.inner.binding.short_id()
    }

    fn is_streamed(&self) -> bool {
        self.inner.binding.is_streamed()
    }

    fn open_file(&self, done: OpenCompletion) {
        let file = self.inner.clone();
        self.inner
            .cache
            .create_file_cache_handle(self.inner.path.clone(), move |handle| {
                let handle = match handle {
                    Ok(handle) => handle,
                    Err(err) => {
                        warn!("Failed to open {:?}: {}.", file.path, err);
                        done.failed();
                        return;
                    }
                };

                let h2 = handle.clone();
                handle.read_all(move |bytes| {
                    h2.close_and_delete();

                    match bytes {
                        Ok(bytes) => {
                            *file.data.lock().unwrap() = Some(bytes);
                            done.succeeded();
                        }
                        Err(err) => {
                            warn!("Failed to read {:?}: {}.", file.path, err);
                            done.failed();
                        }
                    }
                });
            });
    }

    fn load_in_sound_engine(&self, done: LoadCompletion) {
        let data = self.inner.data.lock().unwrap();
        let result = match *data {
            Some(ref bytes) => self.inner.binding.load(self.inner.engine.as_ref(), bytes),
            None => Err(EngineError::NotInitialized),
        };

        match result {
            Ok(()) => done.succeeded(),
            Err(err) => {
                warn!(
                    "Sound engine refused {} {}: {}.",
                    self.type_name(),
                    self.short_id(),
                    err
                );
                done.failed();
            }
        }
    }

    fn unload_from_sound_engine(&self, done: UnloadCompletion) {
        match self.inner.binding.unload(self.inner.engine.as_ref()) {
            Ok(()) => done.done(),
            Err(EngineError::InUse) => {
                debug!(
                    "{} {} is in use, unload deferred.",
                    self.type_name(),
                    self.short_id()
                );
                done.defer();
            }
            Err(err) => {
                warn!(
                    "Failed to unload {} {}: {}.",
                    self.type_name(),
                    self.short_id(),
                    err
                );

                if self.inner.binding.unload_failure_closes_file() {
                    self.inner.data.lock().unwrap().take();
                    done.to_closed_file();
                } else {
                    done.done();
                }
            }
        }
    }

    fn close_file(&self, done: CloseCompletion) {
        self.inner.data.lock().unwrap().take();
        done.done();
    }
}
