//! The low-level audio engine consumed by the loader.
//!
//! Nothing in here renders audio. `SoundEngine` is the narrow set of calls the loader issues to
//! put banks and media in (and out of) the engine, and `FrameHooks` lets the loader run work after
//! the engine finished an audio rendering pass.

use std::sync::Mutex;

use failure::Fail;

/// 32-bits identifier of cooked objects, as generated by the offline export step.
pub type ShortId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum EngineError {
    /// The engine still uses the resource. Retry after an audio pass.
    #[fail(display = "resource is in use")]
    InUse,
    #[fail(display = "engine is not initialized")]
    NotInitialized,
    #[fail(display = "engine result code {}", _0)]
    Code(i32),
}

pub type EngineResult = ::std::result::Result<(), EngineError>;

pub trait SoundEngine: Send + Sync + 'static {
    fn load_bank_memory(&self, bank_id: ShortId, data: &[u8]) -> EngineResult;
    fn unload_bank(&self, bank_id: ShortId) -> EngineResult;

    fn set_media(&self, media_id: ShortId, data: &[u8]) -> EngineResult;
    fn unset_media(&self, media_id: ShortId) -> EngineResult;

    fn set_external_source(&self, cookie: ShortId, data: &[u8]) -> EngineResult;
    fn unset_external_source(&self, cookie: ShortId) -> EngineResult;

    /// Stops every playing sound.
    fn stop_all(&self);
}

pub type PassCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait FrameHooks: Send + Sync + 'static {
    /// Runs `func` once, after the next audio rendering pass completed.
    fn after_pass(&self, func: PassCallback);
}

/// `FrameHooks` driven by whoever owns the audio thread: call `pump` at the end of every audio
/// rendering pass.
#[derive(Default)]
pub struct FramePump {
    pending: Mutex<Vec<PassCallback>>,
}

impl FramePump {
    pub fn new() -> Self {
        FramePump::default()
    }

    /// Runs the callbacks registered before this pass. Returns how many ran.
    pub fn pump(&self) -> usize {
        let callbacks = ::std::mem::replace(&mut *self.pending.lock().unwrap(), Vec::new());
        let len = callbacks.len();

        for v in callbacks {
            v();
        }

        len
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

impl FrameHooks for FramePump {
    fn after_pass(&self, func: PassCallback) {
        self.pending.lock().unwrap().push(func);
    }
}
