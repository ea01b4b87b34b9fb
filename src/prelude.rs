pub use crate::engine::{EngineError, FrameHooks, FramePump, ShortId, SoundEngine};
pub use crate::errors::{Error, Result};
pub use crate::file::{Directory, FileSystem, Memory};
pub use crate::loader::cooked::*;
pub use crate::loader::{
    AuxBusHandle, EventHandle, ExternalSourceHandle, GroupValueHandle, InitBankHandle,
    LoaderState, LoadedIds, MediaHandle, ObjectKind, ReloadLanguage, ResourceLoader,
    ShareSetHandle, SoundBankHandle,
};
pub use crate::sched::{Future, Promise};
pub use crate::settings::LoaderSettings;
pub use crate::system::{SoundResourceShared, SoundResourceSystem};
