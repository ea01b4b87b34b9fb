//! Functions for loading the loader settings.

use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::loader::cooked::LanguageCookedData;
use crate::loader::{LoaderState, ReloadLanguage};

/// A structure containing configuration data of the sound resource system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// The number of worker threads.
    pub workers: u32,
    /// The stack size of worker threads, the platform default if unset.
    pub stack_size: Option<usize>,
    /// The stage directory cooked files are relative to.
    pub root_path: PathBuf,
    pub platform: String,
    /// The language objects are loaded in initially.
    pub language: LanguageCookedData,
    pub reload_language: ReloadLanguage,
    pub state: LoaderState,
    /// How many queue round-trips teardown waits for a file still in use.
    pub term_retries: u32,
    /// Runs every scheduled job on the calling thread.
    pub headless: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        LoaderSettings {
            workers: 4,
            stack_size: None,
            root_path: PathBuf::from("."),
            platform: "Windows".to_owned(),
            language: LanguageCookedData::sfx(),
            reload_language: ReloadLanguage::Immediate,
            state: LoaderState::Enabled,
            term_retries: 10,
            headless: false,
        }
    }
}

impl LoaderSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value = serde_json::from_str(json).map_err(Error::from)?;
        Self::from_value(value)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value = serde_json::from_reader(reader).map_err(Error::from)?;
        Self::from_value(value)
    }

    // Defaulted fields would otherwise let a sequence deserialize as well.
    fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Settings("expected an object".to_owned()).into());
        }

        let settings: LoaderSettings = serde_json::from_value(value).map_err(Error::from)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.headless && self.workers == 0 {
            return Err(Error::Settings("at least one worker is required".to_owned()).into());
        }

        if self.state == LoaderState::Disabled {
            return Err(Error::Settings(
                "the initial state is either Enabled or AlwaysDisabled".to_owned(),
            )
            .into());
        }

        Ok(())
    }
}
