use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cache::FileCache;
use super::handler::FileHandler;
use super::memory::{EngineBinding, MemoryFileOps};
use super::state::{FileOps, OpOrigin};
use crate::engine::{EngineResult, ShortId, SoundEngine};
use crate::loader::cooked::MediaCookedData;
use crate::loader::managers::{LoadCallback, MediaManager, UnloadCallback};

pub struct MediaBinding(pub MediaCookedData);

impl EngineBinding for MediaBinding {
    fn type_name(&self) -> &'static str {
        "Media"
    }

    fn short_id(&self) -> ShortId {
        self.0.media_id
    }

    fn path(&self) -> &Path {
        &self.0.path
    }

    fn is_streamed(&self) -> bool {
        self.0.is_streamed
    }

    fn load(&self, engine: &dyn SoundEngine, data: &[u8]) -> EngineResult {
        engine.set_media(self.0.media_id, data)
    }

    fn unload(&self, engine: &dyn SoundEngine) -> EngineResult {
        engine.unset_media(self.0.media_id)
    }
}

pub type MediaFileOps = MemoryFileOps<MediaBinding>;

pub struct MediaFileManager {
    handler: Arc<FileHandler>,
    root: PathBuf,
    cache: Arc<FileCache>,
    engine: Arc<dyn SoundEngine>,
}

impl MediaFileManager {
    pub fn new(
        handler: Arc<FileHandler>,
        root: PathBuf,
        cache: Arc<FileCache>,
        engine: Arc<dyn SoundEngine>,
    ) -> Self {
        MediaFileManager {
            handler,
            root,
            cache,
            engine,
        }
    }

    #[inline]
    pub fn handler(&self) -> &Arc<FileHandler> {
        &self.handler
    }

    /// Adds a streaming user. Streamed media are loaded into the engine only while they have
    /// one.
    pub fn open_stream(&self, cooked: &MediaCookedData, callback: LoadCallback) {
        self.increment(cooked, OpOrigin::Streaming, callback);
    }

    pub fn close_stream(&self, cooked: &MediaCookedData, callback: UnloadCallback) {
        self.handler
            .decrement_file_state_use_async(cooked.media_id, OpOrigin::Streaming, callback);
    }

    fn increment(&self, cooked: &MediaCookedData, origin: OpOrigin, callback: LoadCallback) {
        let create = || {
            Box::new(MediaFileOps::new(
                MediaBinding(cooked.clone()),
                &self.root,
                self.cache.clone(),
                self.engine.clone(),
            )) as Box<dyn FileOps>
        };

        self.handler
            .increment_file_state_use_async(cooked.media_id, origin, create, callback);
    }
}

impl MediaManager for MediaFileManager {
    fn load_file(&self, cooked: &MediaCookedData, callback: LoadCallback) {
        self.increment(cooked, OpOrigin::Loading, callback);
    }

    fn unload_file(&self, cooked: &MediaCookedData, callback: UnloadCallback) {
        self.handler
            .decrement_file_state_use_async(cooked.media_id, OpOrigin::Loading, callback);
    }
}
