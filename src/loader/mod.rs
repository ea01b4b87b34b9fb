//! Maps audio objects (events, buses, banks...) to the files they need, and keeps the reference
//! counts of those files right under concurrent loads and unloads.
//!
//! Every mutation of the loader bookkeeping runs on the loader execution queue. Nodes live in an
//! arena and are named by typed handles, so a handle stays valid while other nodes come and go.
//! An operation on a node that is still busy with a previous one waits in the node, and is
//! re-posted to the queue once the node is idle again.

pub mod cooked;
pub mod loaded;
pub mod managers;
pub mod switch;

pub use self::loaded::{
    AuxBusHandle, EventHandle, ExternalSourceHandle, GroupValueHandle, InitBankHandle, LeafHandle,
    LoadedData, LoadedHandle, LoadedIds, MediaHandle, ObjectKind, ShareSetHandle, SoundBankHandle,
};
pub use self::managers::{
    ExternalSourceManager, LoadCallback, MediaManager, SoundBankManager, UnloadCallback,
};

use std::mem;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use self::cooked::*;
use self::loaded::{Cooked, Job, Node, Resolved, Rule};
use self::switch::SwitchIndex;
use crate::engine::{FrameHooks, SoundEngine};
use crate::sched::{collect_all, join_all, ExecutionQueue, Future, Promise, SchedulerShared};
use crate::utils::{Handle, ObjectPool};

/// How already loaded objects follow a language switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadLanguage {
    /// Only records the new language. Reloading is up to the caller.
    Manual,
    /// Reloads localized objects while sounds keep playing.
    Immediate,
    /// Stops every sound and waits for the engine to process it before reloading.
    Safe,
}

impl Default for ReloadLanguage {
    fn default() -> Self {
        ReloadLanguage::Immediate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderState {
    Enabled,
    Disabled,
    /// Never loads anything, whatever `enable` says.
    AlwaysDisabled,
}

impl Default for LoaderState {
    fn default() -> Self {
        LoaderState::Enabled
    }
}

/// The file managers the loader issues reference counts to.
#[derive(Clone)]
pub struct Managers {
    pub sound_banks: Arc<dyn SoundBankManager>,
    pub media: Arc<dyn MediaManager>,
    pub external_sources: Arc<dyn ExternalSourceManager>,
}

#[derive(Clone)]
pub struct ResourceLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    queue: ExecutionQueue,
    data: Mutex<LoaderData>,
    state: Mutex<LoaderState>,
    managers: Managers,
    engine: Arc<dyn SoundEngine>,
    frames: Arc<dyn FrameHooks>,
}

struct LoaderData {
    nodes: ObjectPool<Handle, Node>,
    attached: Vec<Vec<Handle>>,
    language: LanguageCookedData,
    switches: SwitchIndex,
    // Completions collected while the data is locked.
    completions: Vec<Job>,
}

impl LoaderData {
    fn complete<F: FnOnce() + Send + 'static>(&mut self, func: F) {
        self.completions.push(Box::new(func));
    }
}

macro_rules! impl_object_ops {
    ($handle:ident, $load:ident, $unload:ident) => {
        pub fn $load(&self, handle: $handle) -> Future<Option<$handle>> {
            self.load_async(handle)
        }

        pub fn $unload(&self, handle: $handle) -> Future<()> {
            self.unload_async(handle)
        }
    };
}

impl ResourceLoader {
    pub fn new(
        scheduler: Arc<SchedulerShared>,
        managers: Managers,
        engine: Arc<dyn SoundEngine>,
        frames: Arc<dyn FrameHooks>,
        language: LanguageCookedData,
        state: LoaderState,
    ) -> Self {
        let data = LoaderData {
            nodes: ObjectPool::new(),
            attached: vec![Vec::new(); ObjectKind::COUNT],
            language,
            switches: SwitchIndex::new(),
            completions: Vec::new(),
        };

        ResourceLoader {
            inner: Arc::new(LoaderInner {
                queue: ExecutionQueue::new("ResourceLoader", scheduler),
                data: Mutex::new(data),
                state: Mutex::new(state),
                managers,
                engine,
                frames,
            }),
        }
    }

    pub fn state(&self) -> LoaderState {
        *self.inner.state.lock().unwrap()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    pub fn enable(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == LoaderState::AlwaysDisabled {
            warn!("Resource loader is always disabled, ignoring enable.");
        } else {
            *state = LoaderState::Enabled;
        }
    }

    pub fn disable(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == LoaderState::Enabled {
            *state = LoaderState::Disabled;
        }
    }

    pub fn current_language(&self) -> LanguageCookedData {
        self.inner.data.lock().unwrap().language.clone()
    }

    /// Returns true if no object is loaded and no group value is in use.
    pub fn is_empty(&self) -> bool {
        let data = self.inner.data.lock().unwrap();
        data.attached.iter().all(|v| v.is_empty()) && data.switches.is_empty()
    }

    /// Returns the number of loaded objects of `kind`.
    pub fn loaded_count(&self, kind: ObjectKind) -> usize {
        self.inner.data.lock().unwrap().attached[kind.index()].len()
    }

    pub fn create_aux_bus_node(
        &self,
        cooked: &LocalizedAuxBusCookedData,
        language_override: Option<&LanguageCookedData>,
    ) -> Option<AuxBusHandle> {
        self.create_localized(Cooked::AuxBus(cooked.clone()), language_override)
            .map(AuxBusHandle::from)
    }

    pub fn create_event_node(
        &self,
        cooked: &LocalizedEventCookedData,
        language_override: Option<&LanguageCookedData>,
    ) -> Option<EventHandle> {
        self.create_localized(Cooked::Event(cooked.clone()), language_override)
            .map(EventHandle::from)
    }

    pub fn create_share_set_node(
        &self,
        cooked: &LocalizedShareSetCookedData,
        language_override: Option<&LanguageCookedData>,
    ) -> Option<ShareSetHandle> {
        self.create_localized(Cooked::ShareSet(cooked.clone()), language_override)
            .map(ShareSetHandle::from)
    }

    pub fn create_sound_bank_node(
        &self,
        cooked: &LocalizedSoundBankCookedData,
        language_override: Option<&LanguageCookedData>,
    ) -> Option<SoundBankHandle> {
        self.create_localized(Cooked::SoundBank(cooked.clone()), language_override)
            .map(SoundBankHandle::from)
    }

    pub fn create_external_source_node(
        &self,
        cooked: &ExternalSourceCookedData,
    ) -> ExternalSourceHandle {
        self.create(Cooked::ExternalSource(cooked.clone())).into()
    }

    pub fn create_group_value_node(&self, cooked: &GroupValueCookedData) -> GroupValueHandle {
        self.create(Cooked::GroupValue(*cooked)).into()
    }

    pub fn create_init_bank_node(&self, cooked: &InitBankCookedData) -> InitBankHandle {
        self.create(Cooked::InitBank(cooked.clone())).into()
    }

    pub fn create_media_node(&self, cooked: &MediaCookedData) -> MediaHandle {
        self.create(Cooked::Media(cooked.clone())).into()
    }

    impl_object_ops!(AuxBusHandle, load_aux_bus_async, unload_aux_bus_async);
    impl_object_ops!(EventHandle, load_event_async, unload_event_async);
    impl_object_ops!(
        ExternalSourceHandle,
        load_external_source_async,
        unload_external_source_async
    );
    impl_object_ops!(GroupValueHandle, load_group_value_async, unload_group_value_async);
    impl_object_ops!(InitBankHandle, load_init_bank_async, unload_init_bank_async);
    impl_object_ops!(MediaHandle, load_media_async, unload_media_async);
    impl_object_ops!(ShareSetHandle, load_share_set_async, unload_share_set_async);
    impl_object_ops!(SoundBankHandle, load_sound_bank_async, unload_sound_bank_async);

    /// Loads the files of the node named by `handle`. Resolves to the handle once the node is
    /// loaded, or to `None` if it could not be; the node is deleted in that case.
    pub fn load_async<H: LoadedHandle>(&self, handle: H) -> Future<Option<H>> {
        let mut promise = Promise::new();
        let future = promise.get_future();

        let node = handle.into();
        self.inner
            .post(move |this, data| this.load_node(data, node, H::KIND, promise));

        future.next(move |ok| if *ok { Some(handle) } else { None })
    }

    /// Releases the files of the node named by `handle`, then deletes it. Best-effort: unknown
    /// handles complete right away.
    pub fn unload_async<H: LoadedHandle>(&self, handle: H) -> Future<()> {
        let mut promise = Promise::new();
        let future = promise.get_future();

        let node = handle.into();
        self.inner
            .post(move |this, data| this.unload_node(data, node, H::KIND, promise));

        future
    }

    /// Returns true if some of the files of the node are loaded. For events, this includes the
    /// files of their active switch container leaves.
    pub fn is_loaded<H: LoadedHandle>(&self, handle: H) -> bool {
        let data = self.inner.data.lock().unwrap();
        let node = match data.nodes.get(handle.into()) {
            Some(node) if node.kind() == H::KIND => node,
            _ => return false,
        };

        node.loaded.is_loaded()
            || node.group_value_loaded
            || node.leaves.iter().any(|&v| {
                data.switches
                    .leaves
                    .get(v)
                    .map(|v| v.loaded.is_loaded())
                    .unwrap_or(false)
            })
    }

    #[inline]
    pub fn is_event_loaded(&self, handle: EventHandle) -> bool {
        self.is_loaded(handle)
    }

    /// Returns the ids of the files loaded on behalf of the node, leaves included.
    pub fn loaded_resources<H: LoadedHandle>(&self, handle: H) -> Option<LoadedIds> {
        let data = self.inner.data.lock().unwrap();
        let node = match data.nodes.get(handle.into()) {
            Some(node) if node.kind() == H::KIND => node,
            _ => return None,
        };

        let mut ids = LoadedIds::default();
        ids.extend(&node.loaded);

        for &v in &node.leaves {
            if let Some(leaf) = data.switches.leaves.get(v) {
                ids.extend(&leaf.loaded);
            }
        }

        Some(ids)
    }

    #[inline]
    pub fn loaded_event_resources(&self, handle: EventHandle) -> Option<LoadedIds> {
        self.loaded_resources(handle)
    }

    /// Switches the current language. Loaded localized objects that use the previous language
    /// are reloaded in the new one according to `reload`.
    pub fn set_language_async(
        &self,
        language: LanguageCookedData,
        reload: ReloadLanguage,
    ) -> Future<()> {
        let old = {
            let mut data = self.inner.data.lock().unwrap();
            if data.language == language {
                return Promise::fulfilled(());
            }

            mem::replace(&mut data.language, language.clone())
        };

        info!(
            "Switching language from {} to {} ({:?}).",
            old.language_name, language.language_name, reload
        );

        if reload == ReloadLanguage::Manual {
            return Promise::fulfilled(());
        }

        let ready = if reload == ReloadLanguage::Safe {
            self.inner.engine.stop_all();

            // Two passes, so that the stop has been processed by the engine.
            let mut promise = Promise::new();
            let ready = promise.get_future();
            after_passes(self.inner.frames.clone(), 2, promise);
            ready
        } else {
            Promise::fulfilled(())
        };

        let mut promise = Promise::new();
        let future = promise.get_future();

        self.inner.resume(ready, move |this, data, _| {
            this.switch_language(data, old, language, promise)
        });

        future
    }

    /// Closes the loader queue. Objects still loaded at this point are reported and leaked.
    pub fn term(&self) {
        if !self.is_empty() {
            let data = self.inner.data.lock().unwrap();
            warn!(
                "Terminating resource loader with {} objects still loaded.",
                data.attached.iter().map(|v| v.len()).sum::<usize>()
            );
        }

        self.inner.queue.close();
    }

    fn create(&self, cooked: Cooked) -> Handle {
        let mut data = self.inner.data.lock().unwrap();
        data.nodes.create(Node::new(cooked, None))
    }

    fn create_localized(
        &self,
        cooked: Cooked,
        language_override: Option<&LanguageCookedData>,
    ) -> Option<Handle> {
        let mut data = self.inner.data.lock().unwrap();

        let key = match language_map_key(&cooked.languages(), language_override, &data.language) {
            Some(key) => key,
            None => {
                warn!(
                    "Could not find a language for {:?} {}.",
                    cooked.kind(),
                    cooked.debug_name()
                );
                return None;
            }
        };

        Some(data.nodes.create(Node::new(cooked, Some(key))))
    }
}

/// Picks the variant of a localized object: the override if there is one for it, else the
/// language-independent one, else the current language.
pub fn language_map_key(
    languages: &[&LanguageCookedData],
    language_override: Option<&LanguageCookedData>,
    current: &LanguageCookedData,
) -> Option<LanguageCookedData> {
    let has = |v: &LanguageCookedData| languages.iter().any(|l| *l == v);

    if let Some(v) = language_override {
        if has(v) {
            return Some(v.clone());
        }

        info!(
            "Language {} is not available, falling back to {}.",
            v.language_name, current.language_name
        );
    }

    let sfx = LanguageCookedData::sfx();
    if has(&sfx) {
        return Some(sfx);
    }

    if has(current) {
        return Some(current.clone());
    }

    None
}

fn after_passes(frames: Arc<dyn FrameHooks>, count: u32, promise: Promise<()>) {
    if count == 0 {
        promise.emplace_value(());
        return;
    }

    let f2 = frames.clone();
    frames.after_pass(Box::new(move || after_passes(f2, count - 1, promise)));
}

fn file_future<F: FnOnce(LoadCallback)>(issue: F) -> Future<bool> {
    let mut promise = Promise::new();
    let future = promise.get_future();
    issue(Box::new(move |ok| promise.emplace_value(ok)));
    future
}

fn unload_future<F: FnOnce(UnloadCallback)>(issue: F) -> Future<()> {
    let mut promise = Promise::new();
    let future = promise.get_future();
    issue(Box::new(move || promise.emplace_value(())));
    future
}

impl LoaderInner {
    fn is_enabled(&self) -> bool {
        *self.state.lock().unwrap() == LoaderState::Enabled
    }

    /// Runs `func` on the loader queue with the data locked.
    fn post<F>(self: &Arc<Self>, func: F)
    where
        F: FnOnce(&Arc<Self>, &mut LoaderData) + Send + 'static,
    {
        let this = self.clone();
        self.queue.async_(move || this.with_data(func));
    }

    /// Runs `func` with the data locked, then the completions it collected, unlocked.
    fn with_data<F>(self: &Arc<Self>, func: F)
    where
        F: FnOnce(&Arc<Self>, &mut LoaderData),
    {
        let completions = {
            let mut data = self.data.lock().unwrap();
            func(self, &mut data);
            mem::replace(&mut data.completions, Vec::new())
        };

        for v in completions {
            v();
        }
    }

    /// Continues with `func` on the loader queue once `future` is ready.
    fn resume<T, F>(self: &Arc<Self>, future: Future<T>, func: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Arc<Self>, &mut LoaderData, &T) + Send + 'static,
    {
        let this = self.clone();
        future.then(move |ready| {
            this.post(move |this, data| func(this, data, ready.get()));
        });
    }

    fn load_node(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        kind: ObjectKind,
        promise: Promise<bool>,
    ) {
        let (attached, resolved, name) = match data.nodes.get(handle) {
            Some(node) if node.kind() == kind => (
                node.attached,
                node.resolve().is_some(),
                node.cooked.debug_name().to_owned(),
            ),
            _ => {
                warn!("Loading unknown {:?} {}.", kind, handle);
                data.complete(move || promise.emplace_value(false));
                return;
            }
        };

        if attached {
            debug!("{:?} {} is already loaded.", kind, name);
            data.complete(move || promise.emplace_value(true));
            return;
        }

        if !self.is_enabled() {
            info!("Resource loader is disabled, skipping {:?} {}.", kind, name);
            self.delete_node(data, handle);
            data.complete(move || promise.emplace_value(false));
            return;
        }

        if !resolved {
            error!("Could not find {:?} {} in its language.", kind, name);
            self.delete_node(data, handle);
            data.complete(move || promise.emplace_value(false));
            return;
        }

        debug!("Loading {:?} {}.", kind, name);
        let loaded = self.load_resources(data, handle);

        self.resume(loaded, move |this, data, &ok| {
            let ok = match data.nodes.get(handle) {
                Some(node) => ok || node.attached,
                None => false,
            };

            let busy = data
                .nodes
                .get(handle)
                .map(|v| v.processing > 0)
                .unwrap_or(false);

            if ok {
                this.attach(data, handle);
            } else if busy {
                // An unload is running on the node and deletes it when done.
                error!("Could not load {:?} {}.", kind, name);
            } else {
                error!("Could not load {:?} {}.", kind, name);
                this.delete_node(data, handle);
            }

            data.complete(move || promise.emplace_value(ok));
        });
    }

    fn unload_node(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        kind: ObjectKind,
        promise: Promise<()>,
    ) {
        let name = match data.nodes.get(handle) {
            Some(node) if node.kind() == kind => node.cooked.debug_name().to_owned(),
            _ => {
                debug!("Unloading unknown {:?} {}.", kind, handle);
                data.complete(move || promise.emplace_value(()));
                return;
            }
        };

        debug!("Unloading {:?} {}.", kind, name);
        self.detach(data, handle);

        let unloaded = self.unload_resources(data, handle);
        self.resume(unloaded, move |this, data, _| {
            this.delete_node(data, handle);
            data.complete(move || promise.emplace_value(()));
        });
    }

    fn attach(&self, data: &mut LoaderData, handle: Handle) {
        if let Some(node) = data.nodes.get_mut(handle) {
            if !node.attached {
                node.attached = true;
                data.attached[node.kind().index()].push(handle);
            }
        }
    }

    fn detach(&self, data: &mut LoaderData, handle: Handle) {
        if let Some(node) = data.nodes.get_mut(handle) {
            if node.attached {
                node.attached = false;
                data.attached[node.kind().index()].retain(|&v| v != handle);
            }
        }
    }

    fn delete_node(&self, data: &mut LoaderData, handle: Handle) {
        self.detach(data, handle);

        if let Some(node) = data.nodes.free(handle) {
            if node.processing > 0 || node.holds_resources() {
                programming_error!(
                    "Deleting {:?} {} while it is still in use.",
                    node.kind(),
                    node.cooked.debug_name()
                );
            }

            for v in node.waiting {
                data.complete(v);
            }
        }
    }

    fn end_processing(&self, data: &mut LoaderData, handle: Handle) {
        if let Some(node) = data.nodes.get_mut(handle) {
            node.processing -= 1;
            if node.processing == 0 {
                for v in node.waiting.drain(..).collect::<Vec<_>>() {
                    data.complete(v);
                }
            }
        }
    }

    fn end_leaf_processing(&self, data: &mut LoaderData, leaf: LeafHandle) {
        if let Some(usage) = data.switches.leaves.get_mut(leaf) {
            usage.processing -= 1;
            if usage.processing == 0 {
                for v in usage.waiting.drain(..).collect::<Vec<_>>() {
                    data.complete(v);
                }
            }
        }
    }

    fn load_files(&self, set: &ResourceSet) -> Future<Vec<bool>> {
        let managers = &self.managers;
        let mut futures = Vec::with_capacity(
            set.sound_banks.len() + set.media.len() + set.external_sources.len(),
        );

        for v in &set.sound_banks {
            futures.push(file_future(|cb| managers.sound_banks.load_file(v, cb)));
        }

        for v in &set.media {
            futures.push(file_future(|cb| managers.media.load_file(v, cb)));
        }

        for v in &set.external_sources {
            futures.push(file_future(|cb| managers.external_sources.load_file(v, cb)));
        }

        collect_all(futures)
    }

    fn unload_files(&self, loaded: &LoadedData) -> Future<()> {
        let managers = &self.managers;
        let mut futures = Vec::with_capacity(loaded.len());

        for v in &loaded.sound_banks {
            futures.push(unload_future(|cb| managers.sound_banks.unload_file(v, cb)));
        }

        for v in &loaded.media {
            futures.push(unload_future(|cb| managers.media.unload_file(v, cb)));
        }

        for v in &loaded.external_sources {
            futures.push(unload_future(|cb| managers.external_sources.unload_file(v, cb)));
        }

        join_all(futures)
    }

    fn load_resources(self: &Arc<Self>, data: &mut LoaderData, handle: Handle) -> Future<bool> {
        let mut promise = Promise::new();
        let future = promise.get_future();
        self.load_resources_into(data, handle, promise);
        future
    }

    fn load_resources_into(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        promise: Promise<bool>,
    ) {
        let node = match data.nodes.get_mut(handle) {
            Some(node) => node,
            None => {
                data.complete(move || promise.emplace_value(false));
                return;
            }
        };

        if node.processing > 0 {
            let this = self.clone();
            node.waiting.push(Box::new(move || {
                this.post(move |this, data| this.load_resources_into(data, handle, promise));
            }));
            return;
        }

        if node.holds_resources() {
            warn!(
                "{:?} {} is already loaded.",
                node.kind(),
                node.cooked.debug_name()
            );
            data.complete(move || promise.emplace_value(false));
            return;
        }

        let resolved = match node.resolve() {
            Some(v) => v,
            None => {
                data.complete(move || promise.emplace_value(false));
                return;
            }
        };

        node.processing += 1;

        match resolved {
            Resolved::Files(set, rule) => {
                let results = self.load_files(&set);
                self.resume(results, move |this, data, results| {
                    let loaded = LoadedData::from_results(&set, results);
                    let ok = rule.succeeded(&set, &loaded);
                    this.finish_load(data, handle, loaded, ok, None, promise);
                });
            }

            Resolved::Event(cooked) => {
                let results = self.load_files(&cooked.resources);
                self.resume(results, move |this, data, results| {
                    let loaded = LoadedData::from_results(&cooked.resources, results);
                    let ok = Rule::Bundle.succeeded(&cooked.resources, &loaded);
                    this.finish_load(data, handle, loaded, ok, Some(cooked), promise);
                });
            }

            Resolved::GroupValue(v) => {
                node.group_value_loaded = true;

                let gained = data.switches.activate(v);
                let futures = gained
                    .into_iter()
                    .map(|leaf| self.load_leaf(data, leaf))
                    .collect();

                // Group values always succeed, whatever happens to the leaves.
                self.resume(join_all(futures), move |this, data, _| {
                    this.end_processing(data, handle);
                    data.complete(move || promise.emplace_value(true));
                });
            }
        }
    }

    fn finish_load(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        loaded: LoadedData,
        ok: bool,
        event: Option<EventCookedData>,
        promise: Promise<bool>,
    ) {
        let node = match data.nodes.get_mut(handle) {
            Some(node) => node,
            None => {
                programming_error!("Node {} was deleted while loading.", handle);
                let _ = self.unload_files(&loaded);
                data.complete(move || promise.emplace_value(false));
                return;
            }
        };

        if !ok {
            warn!(
                "Could not load every sound bank of {:?} {}, unloading.",
                node.kind(),
                node.cooked.debug_name()
            );

            self.resume(self.unload_files(&loaded), move |this, data, _| {
                this.end_processing(data, handle);
                data.complete(move || promise.emplace_value(false));
            });
            return;
        }

        node.loaded = loaded;

        let switches = match event {
            Some(ref cooked) => self.load_event_switches(data, handle, cooked),
            None => Promise::fulfilled(()),
        };

        self.resume(switches, move |this, data, _| {
            this.end_processing(data, handle);
            data.complete(move || promise.emplace_value(true));
        });
    }

    /// Loads the group values the event requires, and registers its switch container leaves.
    fn load_event_switches(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        cooked: &EventCookedData,
    ) -> Future<()> {
        let mut futures = Vec::new();
        let mut required = Vec::with_capacity(cooked.required_group_values.len());

        for &v in &cooked.required_group_values {
            let gv = data.nodes.create(Node::new(Cooked::GroupValue(v), None));
            required.push(gv);
            futures.push(self.load_resources(data, gv).next(|_| ()));
        }

        let mut leaves = Vec::with_capacity(cooked.switch_container_leaves.len());
        for v in &cooked.switch_container_leaves {
            if v.group_value_set.is_empty() {
                warn!(
                    "Event {} has a switch container leaf without group values.",
                    cooked.debug_name
                );
                continue;
            }

            let leaf = data.switches.add_leaf(v.clone());
            leaves.push(leaf);
            futures.push(self.load_leaf(data, leaf));
        }

        if let Some(node) = data.nodes.get_mut(handle) {
            node.required_group_values = required;
            node.leaves = leaves;
        }

        join_all(futures)
    }

    fn unload_resources(self: &Arc<Self>, data: &mut LoaderData, handle: Handle) -> Future<()> {
        let mut promise = Promise::new();
        let future = promise.get_future();
        self.unload_resources_into(data, handle, promise);
        future
    }

    fn unload_resources_into(
        self: &Arc<Self>,
        data: &mut LoaderData,
        handle: Handle,
        promise: Promise<()>,
    ) {
        let node = match data.nodes.get_mut(handle) {
            Some(node) => node,
            None => {
                data.complete(move || promise.emplace_value(()));
                return;
            }
        };

        if node.processing > 0 {
            let this = self.clone();
            node.waiting.push(Box::new(move || {
                this.post(move |this, data| this.unload_resources_into(data, handle, promise));
            }));
            return;
        }

        node.processing += 1;

        let loaded = mem::replace(&mut node.loaded, LoadedData::default());
        let required = mem::replace(&mut node.required_group_values, Vec::new());
        let leaves = mem::replace(&mut node.leaves, Vec::new());
        let group_value = match node.cooked {
            Cooked::GroupValue(v) if node.group_value_loaded => Some(v),
            _ => None,
        };
        node.group_value_loaded = false;

        let mut futures = vec![self.unload_files(&loaded)];

        if let Some(v) = group_value {
            for leaf in data.switches.deactivate(v) {
                futures.push(self.unload_leaf(data, leaf));
            }
        }

        for gv in required {
            let mut done = Promise::new();
            futures.push(done.get_future());

            let unloaded = self.unload_resources(data, gv);
            self.resume(unloaded, move |this, data, _| {
                this.delete_node(data, gv);
                data.complete(move || done.emplace_value(()));
            });
        }

        for leaf in leaves {
            let mut done = Promise::new();
            futures.push(done.get_future());

            data.switches.remove_leaf(leaf);
            let unloaded = self.unload_leaf(data, leaf);
            self.resume(unloaded, move |this, data, _| {
                this.delete_leaf_into(data, leaf, done);
            });
        }

        self.resume(join_all(futures), move |this, data, _| {
            this.end_processing(data, handle);
            data.complete(move || promise.emplace_value(()));
        });
    }

    fn load_leaf(self: &Arc<Self>, data: &mut LoaderData, leaf: LeafHandle) -> Future<()> {
        let mut promise = Promise::new();
        let future = promise.get_future();
        self.load_leaf_into(data, leaf, promise);
        future
    }

    fn load_leaf_into(
        self: &Arc<Self>,
        data: &mut LoaderData,
        leaf: LeafHandle,
        promise: Promise<()>,
    ) {
        let usage = match data.switches.leaves.get_mut(leaf) {
            Some(usage) => usage,
            None => {
                data.complete(move || promise.emplace_value(()));
                return;
            }
        };

        if usage.processing > 0 {
            let this = self.clone();
            usage.waiting.push(Box::new(move || {
                this.post(move |this, data| this.load_leaf_into(data, leaf, promise));
            }));
            return;
        }

        // Either done already, or some group value went inactive meanwhile.
        if usage.loaded.is_loaded() || !usage.has_all_keys() {
            data.complete(move || promise.emplace_value(()));
            return;
        }

        trace!("Loading switch container leaf {}.", leaf);
        usage.processing += 1;

        let set = usage.key.resources.clone();
        let results = self.load_files(&set);

        self.resume(results, move |this, data, results| {
            let loaded = LoadedData::from_results(&set, results);
            match data.switches.leaves.get_mut(leaf) {
                Some(usage) => usage.loaded = loaded,
                None => {
                    programming_error!("Switch container leaf {} was deleted while loading.", leaf);
                    let _ = this.unload_files(&loaded);
                }
            }

            this.end_leaf_processing(data, leaf);
            data.complete(move || promise.emplace_value(()));
        });
    }

    fn unload_leaf(self: &Arc<Self>, data: &mut LoaderData, leaf: LeafHandle) -> Future<()> {
        let mut promise = Promise::new();
        let future = promise.get_future();
        self.unload_leaf_into(data, leaf, promise);
        future
    }

    fn unload_leaf_into(
        self: &Arc<Self>,
        data: &mut LoaderData,
        leaf: LeafHandle,
        promise: Promise<()>,
    ) {
        let usage = match data.switches.leaves.get_mut(leaf) {
            Some(usage) => usage,
            None => {
                data.complete(move || promise.emplace_value(()));
                return;
            }
        };

        if usage.processing > 0 {
            let this = self.clone();
            usage.waiting.push(Box::new(move || {
                this.post(move |this, data| this.unload_leaf_into(data, leaf, promise));
            }));
            return;
        }

        // Still fully in use, e.g. a group value came back meanwhile.
        if usage.has_all_keys() || usage.loaded.is_empty() {
            data.complete(move || promise.emplace_value(()));
            return;
        }

        trace!("Unloading switch container leaf {}.", leaf);
        usage.processing += 1;

        let loaded = mem::replace(&mut usage.loaded, LoadedData::default());
        self.resume(self.unload_files(&loaded), move |this, data, _| {
            this.end_leaf_processing(data, leaf);
            data.complete(move || promise.emplace_value(()));
        });
    }

    /// Deletes the leaf record once nothing is processing it anymore.
    fn delete_leaf_into(
        self: &Arc<Self>,
        data: &mut LoaderData,
        leaf: LeafHandle,
        promise: Promise<()>,
    ) {
        let busy = match data.switches.leaves.get_mut(leaf) {
            Some(usage) if usage.processing > 0 => {
                let this = self.clone();
                usage.waiting.push(Box::new(move || {
                    this.post(move |this, data| this.delete_leaf_into(data, leaf, promise));
                }));
                return;
            }
            Some(usage) => usage.loaded.is_loaded(),
            None => false,
        };

        if busy {
            // Loaded again by a late leaf load; release it first.
            let unloaded = self.unload_leaf(data, leaf);
            self.resume(unloaded, move |this, data, _| {
                this.delete_leaf_into(data, leaf, promise)
            });
            return;
        }

        data.switches.leaves.free(leaf);
        data.complete(move || promise.emplace_value(()));
    }

    fn switch_language(
        self: &Arc<Self>,
        data: &mut LoaderData,
        old: LanguageCookedData,
        new: LanguageCookedData,
        promise: Promise<()>,
    ) {
        let kinds = [
            ObjectKind::SoundBank,
            ObjectKind::AuxBus,
            ObjectKind::ShareSet,
            ObjectKind::Event,
        ];

        let affected: Vec<Handle> = kinds
            .iter()
            .flat_map(|kind| data.attached[kind.index()].iter().cloned())
            .filter(|&h| {
                data.nodes
                    .get(h)
                    .map(|v| v.language.as_ref() == Some(&old))
                    .unwrap_or(false)
            })
            .collect();

        info!(
            "Unloading {} objects in language {}.",
            affected.len(),
            old.language_name
        );

        let unloads = affected
            .iter()
            .map(|&h| self.unload_resources(data, h))
            .collect();

        self.resume(join_all(unloads), move |this, data, _| {
            let mut loads = Vec::with_capacity(affected.len());

            for h in affected {
                match data.nodes.get_mut(h) {
                    Some(node) => {
                        node.language = Some(new.clone());
                        if node.resolve().is_none() {
                            error!(
                                "Could not find {:?} {} in language {}.",
                                node.kind(),
                                node.cooked.debug_name(),
                                new.language_name
                            );
                            continue;
                        }
                    }
                    None => continue,
                }

                // Individual reload failures are only logged.
                loads.push(this.load_resources(data, h));
            }

            this.resume(join_all(loads), move |_, data, _| {
                info!("Done switching to language {}.", new.language_name);
                data.complete(move || promise.emplace_value(()));
            });
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn language_key() {
        let (en, fr) = (
            LanguageCookedData::new(1, "English"),
            LanguageCookedData::new(2, "French"),
        );
        let sfx = LanguageCookedData::sfx();

        let localized = [&en, &fr];
        assert_eq!(language_map_key(&localized, Some(&fr), &en), Some(fr.clone()));
        assert_eq!(language_map_key(&localized, None, &en), Some(en.clone()));
        assert_eq!(language_map_key(&localized, None, &sfx), None);

        let both = [&sfx, &fr];
        assert_eq!(language_map_key(&both, None, &fr), Some(sfx.clone()));
        assert_eq!(language_map_key(&both, Some(&en), &fr), Some(sfx.clone()));
        assert_eq!(language_map_key(&both, Some(&fr), &en), Some(fr.clone()));
    }
}
