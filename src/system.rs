//! Wires the scheduler, the file cache, the file handlers and the resource loader together.
//!
//! The services are constructed explicitly and passed down to their users, so several systems
//! can live side by side in one process. Teardown happens in reverse order of construction.

use std::sync::Arc;

use crate::engine::{FrameHooks, SoundEngine};
use crate::errors::*;
use crate::file::{
    ExternalSourceFileManager, FileCache, FileHandler, FileSystem, MediaFileManager,
    SoundBankFileManager,
};
use crate::loader::cooked::LanguageCookedData;
use crate::loader::{Managers, ResourceLoader};
use crate::sched::{Future, SchedulerShared, SchedulerSystem};
use crate::settings::LoaderSettings;

/// The `SoundResourceSystem` owns every service needed to load audio objects.
pub struct SoundResourceSystem {
    scheduler: SchedulerSystem,
    shared: Arc<SoundResourceShared>,
}

impl SoundResourceSystem {
    /// Creates a new `SoundResourceSystem`.
    pub fn new(
        settings: LoaderSettings,
        fs: Arc<dyn FileSystem>,
        engine: Arc<dyn SoundEngine>,
        frames: Arc<dyn FrameHooks>,
    ) -> Result<Self> {
        settings.validate()?;

        let scheduler = if settings.headless {
            SchedulerSystem::headless()
        } else {
            SchedulerSystem::new(settings.workers, settings.stack_size, None)?
        };

        let sched = scheduler.shared();
        let cache = FileCache::new(fs, sched.clone());

        let handlers = [
            FileHandler::new("SoundBankHandler", sched.clone(), frames.clone()),
            FileHandler::new("MediaHandler", sched.clone(), frames.clone()),
            FileHandler::new("ExternalSourceHandler", sched.clone(), frames.clone()),
        ];

        let root = settings.root_path.join(&settings.platform);
        let sound_banks = Arc::new(SoundBankFileManager::new(
            handlers[0].clone(),
            root.clone(),
            cache.clone(),
            engine.clone(),
        ));

        let media = Arc::new(MediaFileManager::new(
            handlers[1].clone(),
            root.clone(),
            cache.clone(),
            engine.clone(),
        ));

        let external_sources = Arc::new(ExternalSourceFileManager::new(
            handlers[2].clone(),
            root,
            cache.clone(),
            engine.clone(),
        ));

        let managers = Managers {
            sound_banks: sound_banks.clone(),
            media: media.clone(),
            external_sources: external_sources.clone(),
        };

        let loader = ResourceLoader::new(
            sched.clone(),
            managers,
            engine,
            frames,
            settings.language.clone(),
            settings.state,
        );

        info!(
            "Sound resource system started with {} workers, language {}.",
            if settings.headless { 0 } else { settings.workers },
            settings.language.language_name
        );

        let shared = Arc::new(SoundResourceShared {
            settings,
            sched,
            cache,
            sound_banks,
            media,
            external_sources,
            loader,
        });

        Ok(SoundResourceSystem { scheduler, shared })
    }

    /// Returns the multi-thread friendly parts of `SoundResourceSystem`.
    #[inline]
    pub fn shared(&self) -> Arc<SoundResourceShared> {
        self.shared.clone()
    }

    /// Closes the loader, the file handlers and the cache, then joins the worker threads.
    pub fn terminate(&self) {
        let shared = &self.shared;
        shared.loader.term();

        let retries = shared.settings.term_retries;
        shared.sound_banks.handler().term(retries);
        shared.media.handler().term(retries);
        shared.external_sources.handler().term(retries);

        shared.cache.term();
        self.scheduler.terminate();
        info!("Sound resource system terminated.");
    }
}

pub struct SoundResourceShared {
    settings: LoaderSettings,
    sched: Arc<SchedulerShared>,
    cache: Arc<FileCache>,
    sound_banks: Arc<SoundBankFileManager>,
    media: Arc<MediaFileManager>,
    external_sources: Arc<ExternalSourceFileManager>,
    loader: ResourceLoader,
}

impl SoundResourceShared {
    #[inline]
    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    #[inline]
    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }

    #[inline]
    pub fn scheduler(&self) -> &Arc<SchedulerShared> {
        &self.sched
    }

    #[inline]
    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    #[inline]
    pub fn sound_banks(&self) -> &Arc<SoundBankFileManager> {
        &self.sound_banks
    }

    /// The media manager, which also opens streams for the engine.
    #[inline]
    pub fn media(&self) -> &Arc<MediaFileManager> {
        &self.media
    }

    #[inline]
    pub fn external_sources(&self) -> &Arc<ExternalSourceFileManager> {
        &self.external_sources
    }

    /// Switches the language with the configured reload mode.
    pub fn set_language_async(&self, language: LanguageCookedData) -> Future<()> {
        self.loader
            .set_language_async(language, self.settings.reload_language)
    }
}
