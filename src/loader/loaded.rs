//! Loaded object nodes, named by stable handles into the loader arena.

use std::iter::FromIterator;

use smallvec::SmallVec;

use super::cooked::*;
use crate::utils::{Handle, HandleLike};

impl_handle!(AuxBusHandle);
impl_handle!(EventHandle);
impl_handle!(ExternalSourceHandle);
impl_handle!(GroupValueHandle);
impl_handle!(InitBankHandle);
impl_handle!(MediaHandle);
impl_handle!(ShareSetHandle);
impl_handle!(SoundBankHandle);
impl_handle!(LeafHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    AuxBus,
    Event,
    ExternalSource,
    GroupValue,
    InitBank,
    Media,
    ShareSet,
    SoundBank,
}

impl ObjectKind {
    pub const COUNT: usize = 8;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kinds whose cooked data comes in per-language variants.
    #[inline]
    pub fn is_localized(self) -> bool {
        match self {
            ObjectKind::AuxBus | ObjectKind::Event | ObjectKind::ShareSet | ObjectKind::SoundBank => {
                true
            }
            _ => false,
        }
    }
}

/// Typed handle of a loaded object node.
pub trait LoadedHandle: HandleLike + Into<Handle> + From<Handle> {
    const KIND: ObjectKind;
}

macro_rules! impl_loaded_handle {
    ($name:ident, $kind:ident) => {
        impl LoadedHandle for $name {
            const KIND: ObjectKind = ObjectKind::$kind;
        }
    };
}

impl_loaded_handle!(AuxBusHandle, AuxBus);
impl_loaded_handle!(EventHandle, Event);
impl_loaded_handle!(ExternalSourceHandle, ExternalSource);
impl_loaded_handle!(GroupValueHandle, GroupValue);
impl_loaded_handle!(InitBankHandle, InitBank);
impl_loaded_handle!(MediaHandle, Media);
impl_loaded_handle!(ShareSetHandle, ShareSet);
impl_loaded_handle!(SoundBankHandle, SoundBank);

/// The files an object actually got loaded, so that unloading releases exactly those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedData {
    pub sound_banks: SmallVec<[SoundBankCookedData; 2]>,
    pub media: SmallVec<[MediaCookedData; 4]>,
    pub external_sources: SmallVec<[ExternalSourceCookedData; 2]>,
}

impl LoadedData {
    /// Keeps the items of `set` whose load reported success. `results` lists sound banks first,
    /// then media, then external sources, as issued.
    pub fn from_results(set: &ResourceSet, results: &[bool]) -> Self {
        let (banks, rest) = results.split_at(set.sound_banks.len().min(results.len()));
        let (media, sources) = rest.split_at(set.media.len().min(rest.len()));

        LoadedData {
            sound_banks: keep(&set.sound_banks, banks),
            media: keep(&set.media, media),
            external_sources: keep(&set.external_sources, sources),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sound_banks.is_empty() && self.media.is_empty() && self.external_sources.is_empty()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        !self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sound_banks.len() + self.media.len() + self.external_sources.len()
    }
}

fn keep<T: Clone, C: FromIterator<T>>(items: &[T], results: &[bool]) -> C {
    items
        .iter()
        .zip(results)
        .filter(|v| *v.1)
        .map(|v| v.0.clone())
        .collect()
}

/// The ids of the files currently loaded on behalf of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedIds {
    pub sound_banks: Vec<ShortId>,
    pub media: Vec<ShortId>,
    pub external_sources: Vec<ShortId>,
}

impl LoadedIds {
    pub(crate) fn extend(&mut self, loaded: &LoadedData) {
        self.sound_banks
            .extend(loaded.sound_banks.iter().map(|v| v.sound_bank_id));
        self.media.extend(loaded.media.iter().map(|v| v.media_id));
        self.external_sources
            .extend(loaded.external_sources.iter().map(|v| v.cookie));
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Cooked {
    AuxBus(LocalizedAuxBusCookedData),
    Event(LocalizedEventCookedData),
    ExternalSource(ExternalSourceCookedData),
    GroupValue(GroupValueCookedData),
    InitBank(InitBankCookedData),
    Media(MediaCookedData),
    ShareSet(LocalizedShareSetCookedData),
    SoundBank(LocalizedSoundBankCookedData),
}

/// How the outcome of an object load is decided from its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rule {
    /// The object is its one file.
    Single,
    /// Every sound bank is mandatory; media and external sources are best-effort.
    Bundle,
}

impl Rule {
    pub fn succeeded(self, set: &ResourceSet, loaded: &LoadedData) -> bool {
        match self {
            Rule::Single => loaded.len() > 0,
            Rule::Bundle => loaded.sound_banks.len() == set.sound_banks.len(),
        }
    }
}

/// The variant of a node's cooked data selected by its language key.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Files(ResourceSet, Rule),
    Event(EventCookedData),
    GroupValue(GroupValueCookedData),
}

impl Cooked {
    pub fn kind(&self) -> ObjectKind {
        match *self {
            Cooked::AuxBus(_) => ObjectKind::AuxBus,
            Cooked::Event(_) => ObjectKind::Event,
            Cooked::ExternalSource(_) => ObjectKind::ExternalSource,
            Cooked::GroupValue(_) => ObjectKind::GroupValue,
            Cooked::InitBank(_) => ObjectKind::InitBank,
            Cooked::Media(_) => ObjectKind::Media,
            Cooked::ShareSet(_) => ObjectKind::ShareSet,
            Cooked::SoundBank(_) => ObjectKind::SoundBank,
        }
    }

    pub fn debug_name(&self) -> &str {
        match *self {
            Cooked::AuxBus(ref v) => &v.debug_name,
            Cooked::Event(ref v) => &v.debug_name,
            Cooked::ExternalSource(ref v) => &v.debug_name,
            Cooked::GroupValue(_) => "GroupValue",
            Cooked::InitBank(ref v) => &v.sound_bank.debug_name,
            Cooked::Media(ref v) => &v.debug_name,
            Cooked::ShareSet(ref v) => &v.debug_name,
            Cooked::SoundBank(ref v) => &v.debug_name,
        }
    }

    pub fn languages(&self) -> Vec<&LanguageCookedData> {
        match *self {
            Cooked::AuxBus(ref v) => v.variants.iter().map(|v| &v.0).collect(),
            Cooked::Event(ref v) => v.variants.iter().map(|v| &v.0).collect(),
            Cooked::ShareSet(ref v) => v.variants.iter().map(|v| &v.0).collect(),
            Cooked::SoundBank(ref v) => v.variants.iter().map(|v| &v.0).collect(),
            _ => Vec::new(),
        }
    }

    pub fn resolve(&self, language: Option<&LanguageCookedData>) -> Option<Resolved> {
        let single = |set| Some(Resolved::Files(set, Rule::Single));
        let bundle = |set| Some(Resolved::Files(set, Rule::Bundle));

        match *self {
            Cooked::AuxBus(ref v) => bundle(v.get(language?)?.resources.clone()),
            Cooked::ShareSet(ref v) => bundle(v.get(language?)?.resources.clone()),
            Cooked::Event(ref v) => Some(Resolved::Event(v.get(language?)?.clone())),
            Cooked::SoundBank(ref v) => single(ResourceSet {
                sound_banks: vec![v.get(language?)?.clone()],
                ..ResourceSet::default()
            }),
            Cooked::Media(ref v) => single(ResourceSet {
                media: vec![v.clone()],
                ..ResourceSet::default()
            }),
            Cooked::ExternalSource(ref v) => single(ResourceSet {
                external_sources: vec![v.clone()],
                ..ResourceSet::default()
            }),
            Cooked::InitBank(ref v) => bundle(ResourceSet {
                sound_banks: vec![v.sound_bank.clone()],
                media: v.media.clone(),
                ..ResourceSet::default()
            }),
            Cooked::GroupValue(v) => Some(Resolved::GroupValue(v)),
        }
    }
}

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Node {
    pub cooked: Cooked,
    pub language: Option<LanguageCookedData>,
    pub loaded: LoadedData,
    pub processing: u32,
    /// Operations that arrived while `processing` was non-zero.
    pub waiting: Vec<Job>,
    pub attached: bool,
    /// Group values only: whether the value counts as active on behalf of this node.
    pub group_value_loaded: bool,
    /// Events only.
    pub required_group_values: Vec<Handle>,
    pub leaves: Vec<LeafHandle>,
}

impl Node {
    pub fn new(cooked: Cooked, language: Option<LanguageCookedData>) -> Self {
        Node {
            cooked,
            language,
            loaded: LoadedData::default(),
            processing: 0,
            waiting: Vec::new(),
            attached: false,
            group_value_loaded: false,
            required_group_values: Vec::new(),
            leaves: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.cooked.kind()
    }

    #[inline]
    pub fn resolve(&self) -> Option<Resolved> {
        self.cooked.resolve(self.language.as_ref())
    }

    /// Whether resources are held on behalf of this node, leaves excluded.
    pub fn holds_resources(&self) -> bool {
        self.loaded.is_loaded()
            || self.group_value_loaded
            || !self.required_group_values.is_empty()
            || !self.leaves.is_empty()
    }
}
