//! Read-only descriptors of audio objects and their dependencies, produced by the offline export
//! step. The loader never writes these.

use std::collections::BTreeSet;
use std::path::PathBuf;

use inlinable_string::InlinableString;
use serde::{Deserialize, Serialize};

pub use crate::engine::ShortId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguageCookedData {
    pub language_id: ShortId,
    pub language_name: InlinableString,
}

impl LanguageCookedData {
    pub fn new<T: Into<InlinableString>>(language_id: ShortId, language_name: T) -> Self {
        LanguageCookedData {
            language_id,
            language_name: language_name.into(),
        }
    }

    /// The language-independent variant.
    pub fn sfx() -> Self {
        LanguageCookedData::new(0, "SFX")
    }

    #[inline]
    pub fn is_sfx(&self) -> bool {
        self.language_id == 0
    }
}

impl Default for LanguageCookedData {
    fn default() -> Self {
        LanguageCookedData::sfx()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundBankCookedData {
    pub sound_bank_id: ShortId,
    pub debug_name: InlinableString,
    /// Relative to the root path of the stage.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaCookedData {
    pub media_id: ShortId,
    pub debug_name: InlinableString,
    pub path: PathBuf,
    /// Streamed media are only loaded into the engine while somebody streams them.
    #[serde(default)]
    pub is_streamed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalSourceCookedData {
    pub cookie: ShortId,
    pub debug_name: InlinableString,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupValueKind {
    State,
    Switch,
}

/// One value of a state or switch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupValueCookedData {
    pub kind: GroupValueKind,
    pub group_id: ShortId,
    pub id: ShortId,
}

/// The files an object needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    #[serde(default)]
    pub sound_banks: Vec<SoundBankCookedData>,
    #[serde(default)]
    pub media: Vec<MediaCookedData>,
    #[serde(default)]
    pub external_sources: Vec<ExternalSourceCookedData>,
}

impl ResourceSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sound_banks.is_empty() && self.media.is_empty() && self.external_sources.is_empty()
    }
}

/// A branch of a switch container. Its resources are needed only while every group value of
/// `group_value_set` is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchContainerLeafCookedData {
    pub group_value_set: BTreeSet<GroupValueCookedData>,
    #[serde(flatten)]
    pub resources: ResourceSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCookedData {
    pub event_id: ShortId,
    pub debug_name: InlinableString,
    #[serde(flatten)]
    pub resources: ResourceSet,
    #[serde(default)]
    pub switch_container_leaves: Vec<SwitchContainerLeafCookedData>,
    /// Group values loaded along with the event.
    #[serde(default)]
    pub required_group_values: Vec<GroupValueCookedData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxBusCookedData {
    pub aux_bus_id: ShortId,
    pub debug_name: InlinableString,
    #[serde(flatten)]
    pub resources: ResourceSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSetCookedData {
    pub share_set_id: ShortId,
    pub debug_name: InlinableString,
    #[serde(flatten)]
    pub resources: ResourceSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitBankCookedData {
    pub sound_bank: SoundBankCookedData,
    #[serde(default)]
    pub media: Vec<MediaCookedData>,
}

/// Per-language variants of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized<T> {
    pub debug_name: InlinableString,
    pub variants: Vec<(LanguageCookedData, T)>,
}

impl<T> Localized<T> {
    pub fn new<N: Into<InlinableString>>(debug_name: N) -> Self {
        Localized {
            debug_name: debug_name.into(),
            variants: Vec::new(),
        }
    }

    pub fn with(mut self, language: LanguageCookedData, value: T) -> Self {
        self.variants.push((language, value));
        self
    }

    pub fn get(&self, language: &LanguageCookedData) -> Option<&T> {
        self.variants
            .iter()
            .find(|v| v.0 == *language)
            .map(|v| &v.1)
    }

    #[inline]
    pub fn contains(&self, language: &LanguageCookedData) -> bool {
        self.get(language).is_some()
    }
}

pub type LocalizedSoundBankCookedData = Localized<SoundBankCookedData>;
pub type LocalizedEventCookedData = Localized<EventCookedData>;
pub type LocalizedAuxBusCookedData = Localized<AuxBusCookedData>;
pub type LocalizedShareSetCookedData = Localized<ShareSetCookedData>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn localized_lookup() {
        let fr = LanguageCookedData::new(2, "French");
        let bank = |id| SoundBankCookedData {
            sound_bank_id: id,
            debug_name: "Bank".into(),
            path: "Bank.bnk".into(),
        };

        let localized = Localized::new("Bank")
            .with(LanguageCookedData::sfx(), bank(1))
            .with(fr.clone(), bank(2));

        assert_eq!(localized.get(&fr).map(|v| v.sound_bank_id), Some(2));
        assert!(localized.contains(&LanguageCookedData::sfx()));
        assert!(!localized.contains(&LanguageCookedData::new(3, "German")));
    }

    #[test]
    fn leaf_from_json() {
        let leaf: SwitchContainerLeafCookedData = ::serde_json::from_str(
            r#"{
                "group_value_set": [{ "kind": "State", "group_id": 1, "id": 2 }],
                "media": [{ "media_id": 9, "debug_name": "M", "path": "9.wem" }]
            }"#,
        )
        .unwrap();

        assert_eq!(leaf.group_value_set.len(), 1);
        assert_eq!(leaf.resources.media[0].media_id, 9);
        assert!(!leaf.resources.media[0].is_streamed);
        assert!(leaf.resources.sound_banks.is_empty());
    }
}
