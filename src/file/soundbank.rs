use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cache::FileCache;
use super::handler::FileHandler;
use super::memory::{EngineBinding, MemoryFileOps};
use super::state::{FileOps, OpOrigin};
use crate::engine::{EngineResult, ShortId, SoundEngine};
use crate::loader::cooked::SoundBankCookedData;
use crate::loader::managers::{LoadCallback, SoundBankManager, UnloadCallback};

pub struct SoundBankBinding(pub SoundBankCookedData);

impl EngineBinding for SoundBankBinding {
    fn type_name(&self) -> &'static str {
        "SoundBank"
    }

    fn short_id(&self) -> ShortId {
        self.0.sound_bank_id
    }

    fn path(&self) -> &Path {
        &self.0.path
    }

    fn load(&self, engine: &dyn SoundEngine, data: &[u8]) -> EngineResult {
        engine.load_bank_memory(self.0.sound_bank_id, data)
    }

    fn unload(&self, engine: &dyn SoundEngine) -> EngineResult {
        engine.unload_bank(self.0.sound_bank_id)
    }

    fn unload_failure_closes_file(&self) -> bool {
        true
    }
}

pub type SoundBankFileOps = MemoryFileOps<SoundBankBinding>;

/// Loads sound banks from memory: the whole bank file is read, then handed to the engine.
pub struct SoundBankFileManager {
    handler: Arc<FileHandler>,
    root: PathBuf,
    cache: Arc<FileCache>,
    engine: Arc<dyn SoundEngine>,
}

impl SoundBankFileManager {
    pub fn new(
        handler: Arc<FileHandler>,
        root: PathBuf,
        cache: Arc<FileCache>,
        engine: Arc<dyn SoundEngine>,
    ) -> Self {
        SoundBankFileManager {
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

impl SoundBankManager for SoundBankFileManager {
    fn load_file(&self, cooked: &SoundBankCookedData, callback: LoadCallback) {
        let create = || {
            let binding = SoundBankBinding(cooked.clone());
            Box::new(SoundBankFileOps::new(
                binding,
                &self.root,
                self.cache.clone(),
                self.engine.clone(),
            )) as Box<dyn FileOps>
        };

        self.handler.increment_file_state_use_async(
            cooked.sound_bank_id,
            OpOrigin::Loading,
            create,
            callback,
        );
    }

    fn unload_file(&self, cooked: &SoundBankCookedData, callback: UnloadCallback) {
        self.handler
            .decrement_file_state_use_async(cooked.sound_bank_id, OpOrigin::Loading, callback);
    }
}
