use std::sync::{Arc, RwLock};

use super::state::{FileOps, FileState, OpOrigin};
use crate::engine::{FrameHooks, ShortId};
use crate::sched::{ExecutionQueue, SchedulerShared};
use crate::utils::FastHashMap;

/// Registry of the file states of one kind of resource, keyed by short id. A state is created by
/// its first increment and removed once its last decrement left it deletable.
pub struct FileHandler {
    name: &'static str,
    states: RwLock<FastHashMap<ShortId, Arc<FileState>>>,
    queue: ExecutionQueue,
    scheduler: Arc<SchedulerShared>,
    frames: Arc<dyn FrameHooks>,
}

impl FileHandler {
    pub fn new(
        name: &'static str,
        scheduler: Arc<SchedulerShared>,
        frames: Arc<dyn FrameHooks>,
    ) -> Arc<Self> {
        Arc::new(FileHandler {
            name,
            states: RwLock::new(FastHashMap::default()),
            queue: ExecutionQueue::new(name, scheduler.clone()),
            scheduler,
            frames,
        })
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, id: ShortId) -> Option<Arc<FileState>> {
        self.states.read().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a reference to the state of `id`, creating it with `create` on first use. A failed
    /// increment releases its reference before `callback` receives false.
    pub fn increment_file_state_use_async<C, F>(
        self: &Arc<Self>,
        id: ShortId,
        origin: OpOrigin,
        create: C,
        callback: F,
    ) where
        C: FnOnce() -> Box<dyn FileOps>,
        F: FnOnce(bool) + Send + 'static,
    {
        // The reservation is taken under the registry lock, so a concurrent deletion either sees
        // it or happens before the lookup.
        let state = {
            let states = self.states.read().unwrap();
            if let Some(state) = states.get(&id) {
                state.reserve();
                Some(state.clone())
            } else {
                None
            }
        };

        let state = match state {
            Some(state) => state,
            None => {
                let mut states = self.states.write().unwrap();
                let state = states
                    .entry(id)
                    .or_insert_with(|| {
                        trace!("{} creates file state {}.", self.name, id);
                        FileState::new(create(), self.scheduler.clone(), self.frames.clone())
                    })
                    .clone();

                state.reserve();
                state
            }
        };

        let (handler, s2) = (self.clone(), state.clone());
        state.increment_reserved(origin, move |ok| {
            if ok {
                callback(true);
            } else {
                handler.release(s2, origin, move || callback(false));
            }
        });
    }

    /// Releases a reference to the state of `id`. The state is removed from the registry once it
    /// is closed and unreferenced.
    pub fn decrement_file_state_use_async<F>(self: &Arc<Self>, id: ShortId, origin: OpOrigin, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let state = match self.get(id) {
            Some(state) => state,
            None => {
                warn!("{} has no file state {} to release.", self.name, id);
                callback();
                return;
            }
        };

        self.release(state, origin, callback);
    }

    /// Terminates every remaining state, then the handler queue.
    pub fn term(&self, retries: u32) {
        self.queue.async_wait(|| {});

        let states: Vec<_> = self.states.write().unwrap().drain().map(|v| v.1).collect();
        if !states.is_empty() {
            warn!("{} still has {} file states.", self.name, states.len());
        }

        for v in states {
            v.term(retries);
        }

        self.queue.close();
    }

    fn release<F>(self: &Arc<Self>, state: Arc<FileState>, origin: OpOrigin, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (handler, id) = (self.clone(), state.short_id());
        state.decrement_count_async(
            origin,
            move |callback| {
                let h2 = handler.clone();
                handler.queue.async_(move || {
                    h2.delete_if_unused(id);
                    callback();
                });
            },
            callback,
        );
    }

    fn delete_if_unused(&self, id: ShortId) {
        let removed = {
            let mut states = self.states.write().unwrap();
            let deletable = states.get(&id).map(|v| v.can_delete()).unwrap_or(false);
            if deletable {
                states.remove(&id)
            } else {
                None
            }
        };

        if let Some(state) = removed {
            trace!("{} deletes file state {}.", self.name, id);
            state.term(0);
        }
    }
}
