//! The file managers the loader issues reference counts to. `crate::file` implements them over
//! file states; tests substitute their own.

use super::cooked::{ExternalSourceCookedData, MediaCookedData, SoundBankCookedData};

pub type LoadCallback = Box<dyn FnOnce(bool) + Send + 'static>;
pub type UnloadCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait SoundBankManager: Send + Sync + 'static {
    /// Adds a reference to the bank. `callback` receives true once it is loaded in the engine.
    fn load_file(&self, cooked: &SoundBankCookedData, callback: LoadCallback);
    fn unload_file(&self, cooked: &SoundBankCookedData, callback: UnloadCallback);
}

pub trait MediaManager: Send + Sync + 'static {
    fn load_file(&self, cooked: &MediaCookedData, callback: LoadCallback);
    fn unload_file(&self, cooked: &MediaCookedData, callback: UnloadCallback);
}

pub trait ExternalSourceManager: Send + Sync + 'static {
    fn load_file(&self, cooked: &ExternalSourceCookedData, callback: LoadCallback);
    fn unload_file(&self, cooked: &ExternalSourceCookedData, callback: UnloadCallback);
}
