#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crayon_soundloader::engine::{EngineError, EngineResult, FramePump, ShortId, SoundEngine};
use crayon_soundloader::file::Memory;
use crayon_soundloader::loader::cooked::*;
use crayon_soundloader::loader::{
    ExternalSourceManager, LoadCallback, Managers, MediaManager, SoundBankManager, UnloadCallback,
};
use crayon_soundloader::sched::Future;
use crayon_soundloader::settings::LoaderSettings;
use crayon_soundloader::system::{SoundResourceShared, SoundResourceSystem};

pub const BANK: &str = "SoundBank";
pub const MEDIA: &str = "Media";
pub const EXTERNAL: &str = "ExternalSource";

pub fn init() {
    let _ = env_logger::try_init();
}

/// Blocks until `future` is ready, failing the test after a generous timeout.
pub fn wait<T: Send + Sync + 'static>(future: &Future<T>) -> &T {
    assert!(
        future.wait_for(Duration::from_secs(10)),
        "future did not complete"
    );
    future.get()
}

pub fn bank(id: ShortId) -> SoundBankCookedData {
    SoundBankCookedData {
        sound_bank_id: id,
        debug_name: format!("Bank{}", id).into(),
        path: format!("{}.bnk", id).into(),
    }
}

pub fn media(id: ShortId) -> MediaCookedData {
    MediaCookedData {
        media_id: id,
        debug_name: format!("Media{}", id).into(),
        path: format!("Media/{}.wem", id).into(),
        is_streamed: false,
    }
}

pub fn streamed_media(id: ShortId) -> MediaCookedData {
    MediaCookedData {
        is_streamed: true,
        ..media(id)
    }
}

pub fn external(cookie: ShortId) -> ExternalSourceCookedData {
    ExternalSourceCookedData {
        cookie,
        debug_name: format!("External{}", cookie).into(),
        path: format!("External/{}.wem", cookie).into(),
    }
}

pub fn state(group_id: ShortId, id: ShortId) -> GroupValueCookedData {
    GroupValueCookedData {
        kind: GroupValueKind::State,
        group_id,
        id,
    }
}

pub fn sfx<T>(name: &str, value: T) -> Localized<T> {
    Localized::new(name).with(LanguageCookedData::sfx(), value)
}

pub fn event(id: ShortId, resources: ResourceSet) -> EventCookedData {
    EventCookedData {
        event_id: id,
        debug_name: format!("Event{}", id).into(),
        resources,
        switch_container_leaves: Vec::new(),
        required_group_values: Vec::new(),
    }
}

pub fn banks(ids: &[ShortId]) -> ResourceSet {
    ResourceSet {
        sound_banks: ids.iter().map(|&v| bank(v)).collect(),
        ..ResourceSet::default()
    }
}

/// A sound engine that only keeps track of what is resident.
#[derive(Default)]
pub struct MockEngine {
    resident: Mutex<HashSet<(&'static str, ShortId)>>,
    loads: Mutex<HashMap<(&'static str, ShortId), usize>>,
    failing: Mutex<HashSet<ShortId>>,
    in_use: AtomicBool,
    double_loads: AtomicUsize,
    stops: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(MockEngine::default())
    }

    pub fn is_resident(&self, kind: &'static str, id: ShortId) -> bool {
        self.resident.lock().unwrap().contains(&(kind, id))
    }

    pub fn resident_count(&self) -> usize {
        self.resident.lock().unwrap().len()
    }

    /// How many times `id` has been handed to the engine.
    pub fn load_count(&self, kind: &'static str, id: ShortId) -> usize {
        self.loads
            .lock()
            .unwrap()
            .get(&(kind, id))
            .cloned()
            .unwrap_or(0)
    }

    pub fn double_loads(&self) -> usize {
        self.double_loads.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn fail(&self, id: ShortId) {
        self.failing.lock().unwrap().insert(id);
    }

    /// While set, every unload is refused with `InUse`.
    pub fn set_in_use(&self, v: bool) {
        self.in_use.store(v, Ordering::SeqCst);
    }

    fn load(&self, kind: &'static str, id: ShortId, data: &[u8]) -> EngineResult {
        assert!(!data.is_empty());

        if self.failing.lock().unwrap().contains(&id) {
            return Err(EngineError::Code(7));
        }

        *self.loads.lock().unwrap().entry((kind, id)).or_insert(0) += 1;
        if !self.resident.lock().unwrap().insert((kind, id)) {
            self.double_loads.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    fn unload(&self, kind: &'static str, id: ShortId) -> EngineResult {
        if self.in_use.load(Ordering::SeqCst) {
            return Err(EngineError::InUse);
        }

        if self.resident.lock().unwrap().remove(&(kind, id)) {
            Ok(())
        } else {
            Err(EngineError::Code(2))
        }
    }
}

impl SoundEngine for MockEngine {
    fn load_bank_memory(&self, bank_id: ShortId, data: &[u8]) -> EngineResult {
        self.load(BANK, bank_id, data)
    }

    fn unload_bank(&self, bank_id: ShortId) -> EngineResult {
        self.unload(BANK, bank_id)
    }

    fn set_media(&self, media_id: ShortId, data: &[u8]) -> EngineResult {
        self.load(MEDIA, media_id, data)
    }

    fn unset_media(&self, media_id: ShortId) -> EngineResult {
        self.unload(MEDIA, media_id)
    }

    fn set_external_source(&self, cookie: ShortId, data: &[u8]) -> EngineResult {
        self.load(EXTERNAL, cookie, data)
    }

    fn unset_external_source(&self, cookie: ShortId) -> EngineResult {
        self.unload(EXTERNAL, cookie)
    }

    fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

type Pending = Box<dyn FnOnce() + Send + 'static>;

/// File managers that only count references. In manual mode, completions are held back until
/// `flush`.
#[derive(Default)]
pub struct MockFiles {
    counts: Mutex<HashMap<(&'static str, ShortId), isize>>,
    failing: Mutex<HashSet<ShortId>>,
    manual: AtomicBool,
    pending: Mutex<Vec<Pending>>,
    requests: AtomicUsize,
}

impl MockFiles {
    pub fn new() -> Arc<Self> {
        Arc::new(MockFiles::default())
    }

    pub fn managers(this: &Arc<Self>) -> Managers {
        Managers {
            sound_banks: this.clone(),
            media: this.clone(),
            external_sources: this.clone(),
        }
    }

    pub fn count(&self, kind: &'static str, id: ShortId) -> isize {
        self.counts
            .lock()
            .unwrap()
            .get(&(kind, id))
            .cloned()
            .unwrap_or(0)
    }

    /// Sum of every reference held.
    pub fn total(&self) -> isize {
        self.counts.lock().unwrap().values().sum()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn fail(&self, id: ShortId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn set_manual(&self, v: bool) {
        self.manual.store(v, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Completes the held back requests, including the ones they issue. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            let pending = ::std::mem::replace(&mut *self.pending.lock().unwrap(), Vec::new());
            if pending.is_empty() {
                return ran;
            }

            ran += pending.len();
            for v in pending {
                v();
            }
        }
    }

    /// Completes a single held back request, picked by `pick` among the pending ones.
    pub fn complete_one(&self, pick: usize) -> bool {
        let job = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return false;
            }

            let len = pending.len();
            pending.remove(pick % len)
        };

        job();
        true
    }

    fn run(&self, func: Pending) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.manual.load(Ordering::SeqCst) {
            self.pending.lock().unwrap().push(func);
        } else {
            func();
        }
    }

    fn load(&self, kind: &'static str, id: ShortId, callback: LoadCallback) {
        let ok = !self.failing.lock().unwrap().contains(&id);
        if ok {
            *self.counts.lock().unwrap().entry((kind, id)).or_insert(0) += 1;
        }

        self.run(Box::new(move || callback(ok)));
    }

    fn unload(&self, kind: &'static str, id: ShortId, callback: UnloadCallback) {
        {
            let mut counts = self.counts.lock().unwrap();
            let v = counts.entry((kind, id)).or_insert(0);
            *v -= 1;
            assert!(*v >= 0, "{} {} released more than acquired", kind, id);
        }

        self.run(callback);
    }
}

impl SoundBankManager for MockFiles {
    fn load_file(&self, cooked: &SoundBankCookedData, callback: LoadCallback) {
        self.load(BANK, cooked.sound_bank_id, callback);
    }

    fn unload_file(&self, cooked: &SoundBankCookedData, callback: UnloadCallback) {
        self.unload(BANK, cooked.sound_bank_id, callback);
    }
}

impl MediaManager for MockFiles {
    fn load_file(&self, cooked: &MediaCookedData, callback: LoadCallback) {
        self.load(MEDIA, cooked.media_id, callback);
    }

    fn unload_file(&self, cooked: &MediaCookedData, callback: UnloadCallback) {
        self.unload(MEDIA, cooked.media_id, callback);
    }
}

impl ExternalSourceManager for MockFiles {
    fn load_file(&self, cooked: &ExternalSourceCookedData, callback: LoadCallback) {
        self.load(EXTERNAL, cooked.cookie, callback);
    }

    fn unload_file(&self, cooked: &ExternalSourceCookedData, callback: UnloadCallback) {
        self.unload(EXTERNAL, cooked.cookie, callback);
    }
}

/// A complete system over an in-memory stage.
pub struct Testbed {
    pub system: SoundResourceSystem,
    pub shared: Arc<SoundResourceShared>,
    pub fs: Arc<Memory>,
    pub engine: Arc<MockEngine>,
    pub pump: Arc<FramePump>,
}

impl Testbed {
    pub fn headless() -> Self {
        Testbed::with_settings(r#"{ "headless": true, "root_path": "stage" }"#)
    }

    pub fn threaded() -> Self {
        Testbed::with_settings(r#"{ "workers": 4, "root_path": "stage" }"#)
    }

    pub fn with_settings(json: &str) -> Self {
        init();

        let settings = LoaderSettings::from_json_str(json).unwrap();
        let fs = Arc::new(Memory::new());
        let engine = MockEngine::new();
        let pump = Arc::new(FramePump::new());

        let system =
            SoundResourceSystem::new(settings, fs.clone(), engine.clone(), pump.clone()).unwrap();
        let shared = system.shared();

        Testbed {
            system,
            shared,
            fs,
            engine,
            pump,
        }
    }

    fn stage<T: AsRef<::std::path::Path>>(&self, path: T) {
        let root = self.shared.settings().root_path.join(&self.shared.settings().platform);
        self.fs.insert(root.join(path), vec![0xAB; 64]);
    }

    pub fn stage_bank(&self, id: ShortId) {
        self.stage(bank(id).path);
    }

    pub fn stage_media(&self, id: ShortId) {
        self.stage(media(id).path);
    }

    pub fn stage_external(&self, cookie: ShortId) {
        self.stage(external(cookie).path);
    }

    pub fn stage_set(&self, set: &ResourceSet) {
        for v in &set.sound_banks {
            self.stage(&v.path);
        }

        for v in &set.media {
            self.stage(&v.path);
        }

        for v in &set.external_sources {
            self.stage(&v.path);
        }
    }

    /// Pumps audio passes until nothing waits on one anymore.
    pub fn pump_all(&self) {
        for _ in 0..64 {
            if self.pump.is_idle() {
                return;
            }

            self.pump.pump();
        }
    }
}
