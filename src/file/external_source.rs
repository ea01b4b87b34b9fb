use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cache::FileCache;
use super::handler::FileHandler;
use super::memory::{EngineBinding, MemoryFileOps};
use super::state::{FileOps, OpOrigin};
use crate::engine::{EngineResult, ShortId, SoundEngine};
use crate::loader::cooked::ExternalSourceCookedData;
use crate::loader::managers::{ExternalSourceManager, LoadCallback, UnloadCallback};

pub struct ExternalSourceBinding(pub ExternalSourceCookedData);

impl EngineBinding for ExternalSourceBinding {
    fn type_name(&self) -> &'static str {
        "ExternalSource"
    }

    fn short_id(&self) -> ShortId {
        self.0.cookie
    }

    fn path(&self) -> &Path {
        &self.0.path
    }

    fn load(&self, engine: &dyn SoundEngine, data: &[u8]) -> EngineResult {
        engine.set_external_source(self.0.cookie, data)
    }

    fn unload(&self, engine: &dyn SoundEngine) -> EngineResult {
        engine.unset_external_source(self.0.cookie)
    }
}

pub type ExternalSourceFileOps = MemoryFileOps<ExternalSourceBinding>;

/// External sources are keyed by cookie.
pub struct ExternalSourceFileManager {
    handler: Arc<FileHandler>,
    root: PathBuf,
    cache: Arc<FileCache>,
    engine: Arc<dyn SoundEngine>,
}

impl ExternalSourceFileManager {
    pub fn new(
        handler: Arc<FileHandler>,
        root: PathBuf,
        cache: Arc<FileCache>,
        engine: Arc<dyn SoundEngine>,
    ) -> Self {
        ExternalSourceFileManager {
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
}

impl ExternalSourceManager for ExternalSourceFileManager {
    fn load_file(&self, cooked: &ExternalSourceCookedData, callback: LoadCallback) {
        let create = || {
            Box::new(ExternalSourceFileOps::new(
                ExternalSourceBinding(cooked.clone()),
                &self.root,
                self.cache.clone(),
                self.engine.clone(),
            )) as Box<dyn FileOps>
        };

        self.handler.increment_file_state_use_async(
            cooked.cookie,
            OpOrigin::Loading,
            create,
            callback,
        );
    }

    fn unload_file(&self, cooked: &ExternalSourceCookedData, callback: UnloadCallback) {
        self.handler
            .decrement_file_state_use_async(cooked.cookie, OpOrigin::Loading, callback);
    }
}
